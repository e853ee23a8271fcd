use crate::cache::{PreviewSession, SessionCache, SessionStatus, SessionWriter};
use crate::classify::{classify_url, ContentKind};
use crate::config::Config;
use crate::crawler::admission::AdmissionState;
use crate::crawler::fetcher::{FetchError, PoliteFetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::pacing::{HumanPacing, PageContext};
use crate::extract::{download_images, Extractor};
use crate::robots::RobotsCache;
use crate::url::{canonicalize, ScopeGuard, SeedContext};
use crate::{Result, SitebinderError};
use tokio_util::sync::CancellationToken;
use url::Url;

/// How many trailing records get their links re-harvested on resume
const RESUME_REHARVEST_PAGES: usize = 100;

/// Options for one crawl run
#[derive(Debug, Default, Clone)]
pub struct CrawlOptions {
    /// Regex patterns rejecting URLs at admission
    pub exclude_patterns: Vec<String>,

    /// Approved/excluded URL sets from an external preview step
    pub preview: Option<PreviewSession>,

    /// Resume this session instead of creating a new one
    pub resume_session: Option<String>,
}

/// What a crawl run produced
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub session_id: String,
    pub pages_scraped: usize,
    pub status: SessionStatus,
    pub failure_reason: Option<String>,
}

impl CrawlReport {
    /// The user-visible success condition: a completed session with at
    /// least one record
    pub fn is_success(&self) -> bool {
        self.status == SessionStatus::Completed && self.pages_scraped > 0
    }
}

/// The single driver of a crawl session
///
/// Pulls from the frontier, paces, fetches, extracts, persists, and admits
/// newly discovered links. Owns the session status: nothing else writes it
/// while a crawl is running.
pub struct Coordinator {
    config: Config,
    seed: Url,
    scope: ScopeGuard,
    admission: AdmissionState,
    frontier: Frontier,
    fetcher: PoliteFetcher,
    pacing: HumanPacing,
    robots: RobotsCache,
    extractor: Extractor,
    cache: SessionCache,
    cancel: CancellationToken,
    options: CrawlOptions,
}

impl Coordinator {
    pub fn new(
        config: Config,
        seed_url: &str,
        options: CrawlOptions,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let seed = canonicalize(seed_url, &config.crawling.tracking_params)?;
        let digest = crate::config::config_digest(&config);

        let scope = ScopeGuard::new(SeedContext::new(
            seed.clone(),
            config.path_scoping.clone(),
            digest,
        ));

        let mut admission = AdmissionState::new(
            config.crawling.max_depth,
            config.crawling.max_pages,
            &options.exclude_patterns,
        )?;
        if let Some(preview) = &options.preview {
            admission.apply_preview(preview)?;
        }

        let fetcher = PoliteFetcher::new(&config.crawling.user_agent, cancel.clone())?;
        let robots = RobotsCache::new(
            &config.crawling.user_agent,
            config.crawling.respect_robots,
        );
        let pacing = HumanPacing::new(
            config.human_behavior.clone(),
            config.crawling.request_delay,
        );
        let extractor = Extractor::new(config.content.clone());
        let cache = SessionCache::new(&config.cache);

        Ok(Self {
            config,
            seed,
            scope,
            admission,
            frontier: Frontier::new(),
            fetcher,
            pacing,
            robots,
            extractor,
            cache,
            cancel,
            options,
        })
    }

    /// The cache this coordinator writes into
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Runs the crawl to completion, cancellation, or failure
    ///
    /// Per-URL errors are recovered locally; cache write failures abort the
    /// session. Cancellation flips the session to failed with reason
    /// "cancelled" and returns a normal report.
    pub async fn run(mut self) -> Result<CrawlReport> {
        let mut writer = self.open_session().await?;
        let mut previous: Option<PageContext> = None;
        let mut first_request = true;

        loop {
            if self.cancel.is_cancelled() {
                return finish_failed(writer, "cancelled");
            }

            let Some(entry) = self.frontier.pop() else {
                break;
            };

            // Polite pacing happens between requests, not before the first
            if !first_request {
                if self.pacing.should_take_break() {
                    let pause = self.pacing.session_break();
                    tracing::info!(
                        "Taking a session break of {:.0}s after {} pages",
                        pause.as_secs_f64(),
                        self.pacing.pages_visited()
                    );
                    if self.fetcher.sleep(pause).await.is_err() {
                        return finish_failed(writer, "cancelled");
                    }
                }

                let mut delay = self.pacing.pre_request_delay(previous.as_ref());
                // A declared crawl-delay is a floor under the human pacing
                if let Some(crawl_delay) = entry
                    .url
                    .host_str()
                    .and_then(|host| self.robots.crawl_delay(host))
                {
                    delay = delay.max(std::time::Duration::from_secs_f64(crawl_delay));
                }
                tracing::debug!("Reading delay {:.1}s before {}", delay.as_secs_f64(), entry.url);
                if self.fetcher.sleep(delay).await.is_err() {
                    return finish_failed(writer, "cancelled");
                }
            }
            first_request = false;

            tracing::info!(
                "Fetching [{}/{}] depth {} {}",
                writer.page_count() + 1,
                self.config.crawling.max_pages,
                entry.depth,
                entry.url
            );

            let outcome = match self.fetcher.fetch(&entry.url).await {
                Ok(outcome) => outcome,
                Err(FetchError::Cancelled) => return finish_failed(writer, "cancelled"),
                Err(e) => {
                    if matches!(&e, FetchError::Http { status: 429, .. }) {
                        self.pacing.note_rate_limited();
                    }
                    tracing::warn!("Fetch failed for {}: {}", entry.url, e);
                    continue;
                }
            };

            if outcome.rate_limited {
                self.pacing.note_rate_limited();
            }

            // Redirects may leave the scope; such pages are read but never
            // persisted and never harvested.
            if outcome.final_url.as_str() != entry.url.as_str() {
                let still_in_scope = canonicalize(
                    outcome.final_url.as_str(),
                    &self.config.crawling.tracking_params,
                )
                .map(|u| self.scope.check(&u).is_admissible())
                .unwrap_or(false);

                if !still_in_scope {
                    tracing::warn!(
                        "Discarding {}: redirected out of scope to {}",
                        entry.url,
                        outcome.final_url
                    );
                    continue;
                }
            }

            let kind = classify_url(&entry.url);
            let mut record = self.extractor.extract(&entry.url, &outcome, kind);
            record.depth = entry.depth;

            if self.config.content.include_images
                && !self.config.content.remove_images
                && record.is_presentable()
                && !record.images.is_empty()
            {
                let temp = match writer.temp_dir() {
                    Ok(dir) => dir,
                    Err(e) => {
                        tracing::error!("Cache write failed, aborting session: {}", e);
                        let _ = writer.mark_failed("cache write failed");
                        return Err(SitebinderError::Cache(e));
                    }
                };
                match download_images(&self.fetcher, &mut record, &temp).await {
                    Ok(stored) if stored > 0 => {
                        tracing::debug!("Stored {} images for {}", stored, entry.url)
                    }
                    Ok(_) => {}
                    Err(FetchError::Cancelled) => {
                        // Extraction already finished, so flush this record
                        // before going down.
                        let _ = writer.append_page(&record);
                        return finish_failed(writer, "cancelled");
                    }
                    Err(e) => tracing::debug!("Image downloads for {}: {}", entry.url, e),
                }
            }

            if let Err(e) = writer.append_page(&record) {
                tracing::error!("Cache write failed, aborting session: {}", e);
                let _ = writer.mark_failed("cache write failed");
                return Err(SitebinderError::Cache(e));
            }

            previous = Some(PageContext {
                word_count: record.word_count,
                image_count: record.images.len(),
                kind: ContentKind::from_str(&record.content_type).unwrap_or(kind),
            });
            self.pacing.record_page();

            let next_depth = entry.depth + 1;
            let referrer = entry.url.as_str().to_string();
            for link in record.links.clone() {
                self.consider_link(&link, next_depth, Some(&referrer)).await;
            }
        }

        let metadata = writer.mark_complete().map_err(SitebinderError::Cache)?;

        if self.config.cache.auto_cleanup {
            let settings = &self.config.cache.cleanup_settings;
            match self
                .cache
                .cleanup(settings.max_age_days, settings.keep_completed, false)
            {
                Ok(removed) if !removed.is_empty() => {
                    tracing::info!("Auto-cleanup removed {} old sessions", removed.len())
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Auto-cleanup failed: {}", e),
            }
        }

        Ok(CrawlReport {
            session_id: metadata.session_id,
            pages_scraped: metadata.pages_scraped,
            status: metadata.status,
            failure_reason: None,
        })
    }

    /// Creates a fresh session (admitting the seed) or reopens an existing
    /// one (rebuilding the admitted set and re-deriving the frontier)
    async fn open_session(&mut self) -> Result<SessionWriter> {
        if let Some(session_id) = self.options.resume_session.clone() {
            let (writer, records) = self
                .cache
                .resume_session(&session_id)
                .map_err(SitebinderError::Cache)?;

            self.admission
                .preload(records.iter().map(|r| r.url.clone()));

            // Re-derive the frontier from the tail of the record log. The
            // fetcher's adaptive state intentionally starts fresh.
            let tail = records.len().saturating_sub(RESUME_REHARVEST_PAGES);
            for record in &records[tail..] {
                let next_depth = record.depth + 1;
                for link in record.links.clone() {
                    self.consider_link(&link, next_depth, Some(&record.url)).await;
                }
            }

            tracing::info!(
                "Resume: {} URLs admitted, {} queued",
                self.admission.admitted_count(),
                self.frontier.len()
            );
            return Ok(writer);
        }

        let digest = self.scope.seed().config_digest.clone();
        let writer = self
            .cache
            .create_session(
                self.seed.as_str(),
                &digest,
                &self.options.exclude_patterns,
            )
            .map_err(SitebinderError::Cache)?;

        let seed = self.seed.clone();
        self.consider_link(seed.as_str(), 0, None).await;
        if self.frontier.is_empty() {
            tracing::warn!("Seed URL {} was not admitted", seed);
        }

        Ok(writer)
    }

    /// Runs one URL through canonicalization, the admission ladder, and the
    /// robots check; enqueues it if everything passes
    async fn consider_link(&mut self, raw: &str, depth: u32, referrer: Option<&str>) {
        let url = match canonicalize(raw, &self.config.crawling.tracking_params) {
            Ok(url) => url,
            Err(_) => return,
        };

        if let Err(rejection) = self.admission.screen(&url, depth, &self.scope) {
            if !rejection.is_silent() {
                tracing::debug!("Rejected {}: {:?}", url, rejection);
            }
            return;
        }

        // Robots is the last rung of the ladder and the only async one
        if !self.robots.is_allowed(&url).await {
            tracing::debug!("Rejected {}: disallowed by robots.txt", url);
            return;
        }

        if self.admission.commit(&url) {
            let kind = classify_url(&url);
            self.frontier
                .push(url, depth, referrer.map(str::to_string), kind.priority());
        }
    }
}

fn finish_failed(writer: SessionWriter, reason: &str) -> Result<CrawlReport> {
    let metadata = writer.mark_failed(reason).map_err(SitebinderError::Cache)?;
    tracing::info!(
        "Session {} stopped: {} ({} pages kept)",
        metadata.session_id,
        reason,
        metadata.pages_scraped
    );
    Ok(CrawlReport {
        session_id: metadata.session_id,
        pages_scraped: metadata.pages_scraped,
        status: metadata.status,
        failure_reason: Some(reason.to_string()),
    })
}
