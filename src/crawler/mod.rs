//! The crawl pipeline
//!
//! Frontier management, the admission ladder, human-like pacing, the polite
//! fetcher, and the coordinator that drives one session end to end.

mod admission;
mod coordinator;
mod fetcher;
mod frontier;
mod pacing;

pub use admission::{AdmissionState, Rejection};
pub use coordinator::{Coordinator, CrawlOptions, CrawlReport};
pub use fetcher::{build_http_client, FetchError, FetchOutcome, PoliteFetcher, RetryPolicy};
pub use frontier::{Frontier, FrontierEntry};
pub use pacing::{HumanPacing, PageContext};

use crate::config::Config;
use crate::Result;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl
///
/// Convenience wrapper over [`Coordinator`]: builds it, runs it, returns the
/// report. The cancellation token lets a caller (e.g. a Ctrl-C handler)
/// stop the crawl cooperatively.
pub async fn crawl(
    config: Config,
    seed_url: &str,
    options: CrawlOptions,
    cancel: CancellationToken,
) -> Result<CrawlReport> {
    Coordinator::new(config, seed_url, options, cancel)?.run().await
}
