//! Sitebinder: a polite site archiver
//!
//! This crate crawls an owner-scoped section of a website, extracts the
//! meaningful document content from each page, caches every page record
//! incrementally on disk, and assembles the cached session into a single
//! output artifact (PDF or Markdown), optionally split into chunks.

pub mod assemble;
pub mod cache;
pub mod classify;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod robots;
pub mod url;

use thiserror::Error;

/// Main error type for sitebinder operations
#[derive(Debug, Error)]
pub enum SitebinderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Output generation error: {0}")]
    Assemble(#[from] assemble::AssembleError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Preview session not found: {0}")]
    PreviewNotFound(String),

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid exclude pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for sitebinder operations
pub type Result<T> = std::result::Result<T, SitebinderError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use cache::{PageRecord, SessionCache, SessionMetadata, SessionStatus};
pub use classify::ContentKind;
pub use config::Config;
pub use url::{canonicalize, extract_host, ScopeGuard, ScopeVerdict, SeedContext};
