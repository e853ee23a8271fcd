//! Session cache: the incrementally persisted record store
//!
//! Each crawl writes into its own session directory: one JSON (optionally
//! gzipped) file per page record plus an atomically rewritten metadata file.
//! The cache supports crash resume, out-of-band export, and validation and
//! repair via [`doctor`].

mod doctor;
mod records;
mod store;

pub use doctor::{doctor, DoctorReport, Issue, SessionDiagnosis};
pub use records::{
    ImageDescriptor, PageMetadata, PageRecord, PreviewSession, SessionMetadata, SessionStatus,
    FLAG_LOW_QUALITY, FLAG_PARSE_ERROR,
};
pub use store::{CacheStats, LoadedSession, SessionCache, SessionWriter};

use thiserror::Error;

/// Errors from cache operations
///
/// IO failures while a session is being written are fatal to the crawl: the
/// orchestrator marks the session failed and aborts.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
