//! Output assembly
//!
//! Consumes a cached session's page records and emits the output artifact:
//! a single Markdown document, a multi-file Markdown bundle, or a PDF; any
//! of them optionally split into size- or page-bounded chunks with an index
//! file tying them together.

mod chunker;
mod markdown;
mod pdf;

pub use chunker::{
    chunk_filename, estimate_record_size, generate_chunked, index_filename, parse_size,
    PagePartitioner, Partitioner, SizePartitioner,
};
pub use markdown::{html_to_markdown, slugify, MarkdownGenerator};
pub use pdf::{CommandRenderer, HtmlRenderer, PdfGenerator, RenderError};

use crate::cache::PageRecord;
use crate::config::Config;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from output generation
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("No records to assemble")]
    NoRecords,

    #[error("Invalid size specification: {0}")]
    InvalidSize(String),

    #[error("Renderer failed: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything a generator needs besides the records themselves
#[derive(Debug, Clone)]
pub struct OutputContext<'a> {
    /// The session's seed URL
    pub base_url: &'a str,

    pub config: &'a Config,

    /// Directory output files are written into
    pub output_dir: &'a Path,
}

impl OutputContext<'_> {
    /// Host of the base URL, used in default filenames
    pub fn host(&self) -> String {
        crate::url::extract_host(self.base_url).unwrap_or_else(|_| "site".to_string())
    }

    /// Default filename stem: host with dots replaced
    pub fn default_stem(&self) -> String {
        self.host().replace('.', "_")
    }
}

/// Position of a chunk within a chunked run
#[derive(Debug, Clone, Copy)]
pub struct ChunkInfo {
    /// 1-based chunk number
    pub number: usize,

    pub total: usize,

    /// Global 1-based page number of this chunk's first record
    pub page_offset: usize,
}

/// An output format backend
///
/// Both variants share this surface; the chunker composes over it without
/// knowing which format it is driving.
pub trait Generator {
    /// File extension without the dot
    fn extension(&self) -> &'static str;

    /// Size-estimation multiplier for this format
    fn size_overhead(&self, config: &Config) -> f64;

    /// Emits the whole artifact; returns the paths written
    fn generate(
        &self,
        records: &[PageRecord],
        ctx: &OutputContext,
    ) -> Result<Vec<PathBuf>, AssembleError>;

    /// Emits one chunk to an explicit path
    fn generate_chunk(
        &self,
        records: &[PageRecord],
        ctx: &OutputContext,
        path: &Path,
        chunk: ChunkInfo,
    ) -> Result<(), AssembleError>;

    /// Emits the chunk index file
    fn generate_index(
        &self,
        chunks: &[(String, usize)],
        ctx: &OutputContext,
        path: &Path,
    ) -> Result<(), AssembleError>;
}

/// Filters a session's records down to the ones worth presenting
///
/// Low-quality pages are dropped here; parse-error stubs pass through so
/// the generators can substitute their placeholder sections.
pub fn presentable(records: Vec<PageRecord>) -> Vec<PageRecord> {
    records
        .into_iter()
        .filter(|r| !r.has_flag(crate::cache::FLAG_LOW_QUALITY))
        .collect()
}
