//! Configuration module for sitebinder
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and computing the scrape-relevant config digest used to key cache
//! sessions.
//!
//! # Example
//!
//! ```no_run
//! use sitebinder::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sitebinder.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawling.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheConfig, ChunkingConfig, CleanupSettings, Config, ContentConfig, CrawlingConfig,
    HumanBehaviorConfig, MarkdownConfig, NavigationPolicy, PathScopingConfig, PdfConfig,
    SizeEstimation,
};

// Re-export parser functions
pub use parser::{config_digest, load_config};
pub use validation::validate;
