use reqwest::{redirect::Policy, Client};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Maximum redirect hops before giving up
const MAX_REDIRECTS: usize = 10;

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Final HTTP status
    pub status: u16,

    /// URL after following redirects
    pub final_url: Url,

    /// Content-Type header value, possibly empty
    pub content_type: String,

    /// Response body
    pub body: String,

    /// Wall-clock time spent on this fetch, including retries
    pub elapsed: Duration,

    /// A 429 was observed at some point during this fetch
    pub rate_limited: bool,
}

impl FetchOutcome {
    pub fn is_html(&self) -> bool {
        self.content_type.is_empty() || self.content_type.contains("text/html")
    }
}

/// Fetch failures, classified for the retry policy
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Too many redirects from {url}")]
    RedirectLimit { url: String },

    #[error("Redirect loop detected at {url}")]
    RedirectLoop { url: String },

    #[error("Invalid redirect target from {url}")]
    InvalidRedirect { url: String },

    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Connection problems and 408/429/5xx responses are worth retrying;
    /// other client errors and redirect pathologies are not.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Http { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

/// Exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_secs(1),
            factor: 2,
            cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Lighter policy for image sub-fetches
    pub fn light() -> Self {
        Self {
            max_retries: 2,
            ..Self::default()
        }
    }

    /// Backoff for a 0-indexed attempt: base * factor^attempt, capped, plus
    /// up to 20% jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .as_millis()
            .saturating_mul(self.factor.pow(attempt) as u128) as u64;
        let capped = exp.min(self.cap.as_millis() as u64);
        let jitter = if capped >= 10 {
            fastrand::u64(0..=capped / 5)
        } else {
            0
        };
        Duration::from_millis(capped.saturating_add(jitter))
    }
}

/// Builds the shared HTTP client
///
/// Redirects are handled manually so that every hop can be checked and
/// loops detected; cookies persist across requests within the session.
pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// The polite fetcher: one request at a time, cancellation-aware
///
/// Owns the HTTP client (and with it the cookie jar). Inter-request pacing
/// lives in [`super::HumanPacing`]; this type handles a single URL's
/// redirects, retries, and backoff.
pub struct PoliteFetcher {
    client: Client,
    retry: RetryPolicy,
    image_retry: RetryPolicy,
    cancel: CancellationToken,
}

impl PoliteFetcher {
    pub fn new(user_agent: &str, cancel: CancellationToken) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(user_agent)?, cancel))
    }

    /// Wraps a caller-provided client
    ///
    /// This is the injection seam for authenticated crawls: an adapter that
    /// has already performed a login builds a client with its cookie jar
    /// pre-populated and hands it in here.
    pub fn with_client(client: Client, cancel: CancellationToken) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            image_retry: RetryPolicy::light(),
            cancel,
        }
    }

    #[cfg(test)]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Sleeps, waking early (with an error) on cancellation
    pub async fn sleep(&self, duration: Duration) -> Result<(), FetchError> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
        }
    }

    /// Fetches a URL with redirect handling and retry/backoff
    pub async fn fetch(&self, url: &Url) -> Result<FetchOutcome, FetchError> {
        let started = Instant::now();
        let mut saw_429 = false;
        let mut attempt = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(mut outcome) => {
                    outcome.elapsed = started.elapsed();
                    outcome.rate_limited = saw_429;
                    return Ok(outcome);
                }
                Err(e) if e.is_retriable() && attempt < self.retry.max_retries => {
                    if matches!(&e, FetchError::Http { status: 429, .. }) {
                        saw_429 = true;
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::debug!(
                        "Retry {}/{} for {} after {:?}: {}",
                        attempt + 1,
                        self.retry.max_retries,
                        url,
                        delay,
                        e
                    );
                    self.sleep(delay).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// A single attempt: follow redirects manually up to the hop limit
    async fn fetch_once(&self, url: &Url) -> Result<FetchOutcome, FetchError> {
        let mut current = url.clone();
        let mut visited: HashSet<String> = HashSet::new();

        loop {
            if !visited.insert(current.as_str().to_string()) {
                return Err(FetchError::RedirectLoop {
                    url: current.to_string(),
                });
            }
            if visited.len() > MAX_REDIRECTS {
                return Err(FetchError::RedirectLimit {
                    url: url.to_string(),
                });
            }

            let response = tokio::select! {
                result = self.client.get(current.clone()).send() => {
                    result.map_err(|e| classify_reqwest_error(&current, e))?
                }
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
            };

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| FetchError::InvalidRedirect {
                        url: current.to_string(),
                    })?;

                let next = current
                    .join(location)
                    .map_err(|_| FetchError::InvalidRedirect {
                        url: current.to_string(),
                    })?;

                tracing::debug!("Following redirect {} -> {}", current, next);
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Http {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            let body = tokio::select! {
                result = response.text() => {
                    result.map_err(|e| FetchError::Network {
                        url: current.to_string(),
                        message: format!("body read failed: {}", e),
                    })?
                }
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
            };

            return Ok(FetchOutcome {
                status: status.as_u16(),
                final_url: current,
                content_type,
                body,
                elapsed: Duration::ZERO,
                rate_limited: false,
            });
        }
    }

    /// Fetches an image body with the lighter retry policy
    ///
    /// Shares the host serialization: called from the same task as page
    /// fetches, between them.
    pub async fn fetch_image(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0;

        loop {
            let result = async {
                let response = tokio::select! {
                    result = self.client.get(url.clone()).send() => {
                        result.map_err(|e| classify_reqwest_error(url, e))?
                    }
                    _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                };

                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Http {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }

                let bytes = tokio::select! {
                    result = response.bytes() => {
                        result.map_err(|e| FetchError::Network {
                            url: url.to_string(),
                            message: format!("body read failed: {}", e),
                        })?
                    }
                    _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                };

                Ok(bytes.to_vec())
            }
            .await;

            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retriable() && attempt < self.image_retry.max_retries => {
                    self.sleep(self.image_retry.delay_for_attempt(attempt)).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn classify_reqwest_error(url: &Url, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Network {
            url: url.to_string(),
            message: "request timeout".to_string(),
        }
    } else if e.is_connect() {
        FetchError::Network {
            url: url.to_string(),
            message: "connection failed".to_string(),
        }
    } else if let Some(status) = e.status() {
        FetchError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}
