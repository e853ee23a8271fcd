//! Robots.txt handling
//!
//! [`RobotsRules`] wraps the directive matcher, [`RobotsCache`] keys parsed
//! rules by host with a 24-hour TTL, and [`fetch_robots`] retrieves the
//! file itself. Fetch failures are treated as permissive (and logged): an
//! unreachable robots.txt never blocks a crawl.

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::RobotsRules;

/// Fetches and parses robots.txt for the host of `url`
///
/// Any failure (network, non-2xx, unreadable body) yields permissive rules.
pub(crate) async fn fetch_robots(url: &url::Url, user_agent: &str) -> RobotsRules {
    let mut robots_url = url.clone();
    robots_url.set_path("/robots.txt");
    robots_url.set_query(None);
    robots_url.set_fragment(None);

    tracing::debug!("Fetching robots.txt from {}", robots_url);

    let client = match reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(std::time::Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Failed to build robots.txt client: {}, allowing all", e);
            return RobotsRules::allow_all();
        }
    };

    match client.get(robots_url.clone()).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(content) => RobotsRules::from_content(&content),
            Err(e) => {
                tracing::warn!("Failed to read robots.txt body for {}: {}", robots_url, e);
                RobotsRules::allow_all()
            }
        },
        Ok(response) => {
            tracing::debug!(
                "robots.txt at {} returned {}, allowing all",
                robots_url,
                response.status()
            );
            RobotsRules::allow_all()
        }
        Err(e) => {
            tracing::debug!("Failed to fetch {}: {}, allowing all", robots_url, e);
            RobotsRules::allow_all()
        }
    }
}
