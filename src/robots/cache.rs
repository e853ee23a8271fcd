//! Per-host robots.txt cache
//!
//! Directives are fetched lazily, once per host, the first time admission
//! needs them, and cached with a 24-hour TTL. Owned by the fetch side of
//! the crawler; one instance per session.

use crate::robots::{fetch_robots, RobotsRules};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// TTL for cached robots.txt entries
const ROBOTS_TTL_HOURS: i64 = 24;

/// A cached robots.txt entry for one host
#[derive(Debug, Clone)]
struct CachedEntry {
    rules: RobotsRules,
    fetched_at: DateTime<Utc>,
}

impl CachedEntry {
    fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(ROBOTS_TTL_HOURS)
    }
}

/// Host-keyed robots.txt directive cache
pub struct RobotsCache {
    entries: HashMap<String, CachedEntry>,
    user_agent: String,
    /// When false, every lookup is permissive and nothing is fetched
    respect_robots: bool,
}

impl RobotsCache {
    pub fn new(user_agent: &str, respect_robots: bool) -> Self {
        Self {
            entries: HashMap::new(),
            user_agent: user_agent.to_string(),
            respect_robots,
        }
    }

    /// Checks whether a URL is allowed, fetching the host's robots.txt on
    /// first use (or after TTL expiry)
    pub async fn is_allowed(&mut self, url: &url::Url) -> bool {
        if !self.respect_robots {
            return true;
        }

        let Some(host) = url.host_str().map(|h| h.to_lowercase()) else {
            return true;
        };

        let needs_fetch = self
            .entries
            .get(&host)
            .map(|entry| entry.is_stale())
            .unwrap_or(true);

        if needs_fetch {
            let rules = fetch_robots(url, &self.user_agent).await;
            self.entries.insert(
                host.clone(),
                CachedEntry {
                    rules,
                    fetched_at: Utc::now(),
                },
            );
        }

        let path_and_query = &url[url::Position::BeforePath..];
        self.entries
            .get(&host)
            .map(|entry| entry.rules.is_allowed(path_and_query, &self.user_agent))
            .unwrap_or(true)
    }

    /// Crawl-delay declared for a host we have already consulted
    pub fn crawl_delay(&self, host: &str) -> Option<f64> {
        self.entries
            .get(host)?
            .rules
            .crawl_delay(&self.user_agent)
    }

    /// Seeds an entry directly; used by tests
    #[cfg(test)]
    fn insert(&mut self, host: &str, rules: RobotsRules) {
        self.entries.insert(
            host.to_string(),
            CachedEntry {
                rules,
                fetched_at: Utc::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn test_disabled_cache_always_allows() {
        let mut cache = RobotsCache::new("Binder", false);
        let url = Url::parse("https://example.org/admin").unwrap();
        assert!(cache.is_allowed(&url).await);
    }

    #[tokio::test]
    async fn test_seeded_rules_consulted() {
        let mut cache = RobotsCache::new("Binder", true);
        cache.insert(
            "example.org",
            RobotsRules::from_content("User-agent: *\nDisallow: /secret"),
        );

        let blocked = Url::parse("https://example.org/secret/page").unwrap();
        let open = Url::parse("https://example.org/guide").unwrap();

        assert!(!cache.is_allowed(&blocked).await);
        assert!(cache.is_allowed(&open).await);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_permissive() {
        // Nothing listens here; fetch fails and falls back to allow-all
        let mut cache = RobotsCache::new("Binder", true);
        let url = Url::parse("http://127.0.0.1:1/guide").unwrap();
        assert!(cache.is_allowed(&url).await);
    }

    #[test]
    fn test_crawl_delay_passthrough() {
        let mut cache = RobotsCache::new("Binder", true);
        cache.insert(
            "example.org",
            RobotsRules::from_content("User-agent: *\nCrawl-delay: 3"),
        );
        assert_eq!(cache.crawl_delay("example.org"), Some(3.0));
        assert_eq!(cache.crawl_delay("other.org"), None);
    }

    #[test]
    fn test_fresh_entry_not_stale() {
        let entry = CachedEntry {
            rules: RobotsRules::allow_all(),
            fetched_at: Utc::now(),
        };
        assert!(!entry.is_stale());
    }

    #[test]
    fn test_old_entry_is_stale() {
        let entry = CachedEntry {
            rules: RobotsRules::allow_all(),
            fetched_at: Utc::now() - Duration::hours(25),
        };
        assert!(entry.is_stale());
    }
}
