//! End-to-end crawl tests
//!
//! These use wiremock servers to exercise the full pipeline: admission,
//! pacing, fetching, extraction, and the session cache.

use sitebinder::cache::{SessionCache, SessionStatus};
use sitebinder::config::Config;
use sitebinder::crawler::{crawl, CrawlOptions};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A config tuned for tests: near-zero delays, no compression
fn test_config(cache_dir: &Path) -> Config {
    let mut config = Config::default();
    config.crawling.max_depth = 2;
    config.crawling.max_pages = 50;
    config.crawling.request_delay = 0.0;
    config.human_behavior.base_reading_time = [0.01, 0.01];
    config.human_behavior.navigation_decision = [0.0, 0.0];
    config.human_behavior.variance_percent = 0;
    config.human_behavior.minimum_delay = 0.0;
    config.human_behavior.weekend_factor = 1.0;
    config.cache.directory = cache_dir.display().to_string();
    config.cache.compression = false;
    config
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn html_page(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{}</title></head><body><main>{}</main></body></html>",
        title, body
    )
}

fn page_urls(cache: &SessionCache, session_id: &str) -> Vec<String> {
    let loaded = cache.load_session(session_id).unwrap();
    loaded.records.iter().map(|r| r.url.clone()).collect()
}

fn page_file_count(cache: &SessionCache, session_id: &str) -> usize {
    std::fs::read_dir(cache.session_dir(session_id).join("pages"))
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.file_name().to_string_lossy().starts_with("page_"))
                .count()
        })
        .unwrap_or(0)
}

#[tokio::test]
async fn test_scoped_crawl_admits_and_rejects() {
    let server = MockServer::start().await;
    let base = server.uri();
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(
        &server,
        "/guide",
        html_page(
            "Guide",
            &format!(
                r#"<p>The guide overview with a fair amount of words.</p>
                <a href="{base}/guide/page1">One</a>
                <a href="{base}/guide/page2">Two</a>
                <a href="{base}/">Home</a>
                <a href="{base}/blog/post">Blog</a>
                <a href="{base}/admin/login">Admin</a>"#,
            ),
        ),
    )
    .await;
    mount_page(&server, "/guide/page1", html_page("One", "<p>Page one body.</p>")).await;
    mount_page(&server, "/guide/page2", html_page("Two", "<p>Page two body.</p>")).await;
    mount_page(&server, "/", html_page("Home", "<p>Homepage body.</p>")).await;
    mount_page(&server, "/blog/post", html_page("Blog", "<p>Blog body.</p>")).await;
    mount_page(&server, "/admin/login", html_page("Admin", "<p>Login.</p>")).await;

    let config = test_config(tmp.path());
    let cache = SessionCache::new(&config.cache);

    let report = crawl(
        config,
        &format!("{}/guide/", base),
        CrawlOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);

    let urls = page_urls(&cache, &report.session_id);
    assert!(urls.iter().any(|u| u.ends_with("/guide")));
    assert!(urls.iter().any(|u| u.ends_with("/guide/page1")));
    assert!(urls.iter().any(|u| u.ends_with("/guide/page2")));
    // Homepage admitted through allow_homepage
    assert!(urls.iter().any(|u| u == &format!("{}/", base)));
    // Out of scope and blocked-technical URLs never produce records
    assert!(!urls.iter().any(|u| u.contains("/blog/")));
    assert!(!urls.iter().any(|u| u.contains("/admin/")));
}

#[tokio::test]
async fn test_at_most_one_record_per_url() {
    let server = MockServer::start().await;
    let base = server.uri();
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    // Every page links to every other page, so dedupe has to work
    for (p, others) in [
        ("/guide", vec!["/guide/a", "/guide/b"]),
        ("/guide/a", vec!["/guide", "/guide/b"]),
        ("/guide/b", vec!["/guide", "/guide/a"]),
    ] {
        let links: String = others
            .iter()
            .map(|o| format!(r#"<a href="{}{}">x</a>"#, base, o))
            .collect();
        mount_page(&server, p, html_page(p, &format!("<p>Body text.</p>{}", links))).await;
    }

    let config = test_config(tmp.path());
    let cache = SessionCache::new(&config.cache);

    let report = crawl(
        config,
        &format!("{}/guide", base),
        CrawlOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let urls = page_urls(&cache, &report.session_id);
    let mut deduped = urls.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(urls.len(), deduped.len(), "duplicate records: {:?}", urls);
    assert_eq!(report.pages_scraped, 3);
}

#[tokio::test]
async fn test_max_pages_bounds_the_crawl() {
    let server = MockServer::start().await;
    let base = server.uri();
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    let links: String = (1..=10)
        .map(|i| format!(r#"<a href="{}/guide/p{}">p{}</a>"#, base, i, i))
        .collect();
    mount_page(&server, "/guide", html_page("Hub", &format!("<p>Hub.</p>{}", links))).await;
    for i in 1..=10 {
        mount_page(
            &server,
            &format!("/guide/p{}", i),
            html_page(&format!("P{}", i), "<p>Body.</p>"),
        )
        .await;
    }

    let mut config = test_config(tmp.path());
    config.crawling.max_pages = 4;

    let report = crawl(
        config,
        &format!("{}/guide", base),
        CrawlOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert!(report.pages_scraped <= 4);
}

#[tokio::test]
async fn test_max_pages_zero_completes_immediately() {
    let server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;

    let mut config = test_config(tmp.path());
    config.crawling.max_pages = 0;

    let report = crawl(
        config,
        &format!("{}/guide", server.uri()),
        CrawlOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.pages_scraped, 0);
}

#[tokio::test]
async fn test_polite_pacing_enforces_gaps() {
    let server = MockServer::start().await;
    let base = server.uri();
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(
        &server,
        "/guide",
        html_page(
            "Hub",
            &format!(
                r#"<p>Hub.</p><a href="{base}/guide/a">a</a><a href="{base}/guide/b">b</a>"#
            ),
        ),
    )
    .await;
    mount_page(&server, "/guide/a", html_page("A", "<p>A body.</p>")).await;
    mount_page(&server, "/guide/b", html_page("B", "<p>B body.</p>")).await;

    let mut config = test_config(tmp.path());
    config.crawling.max_pages = 3;
    // One-second reading gap between adjacent requests
    config.human_behavior.base_reading_time = [1.0, 1.0];

    let started = Instant::now();
    let report = crawl(
        config,
        &format!("{}/guide", base),
        CrawlOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.pages_scraped, 3);
    // Two inter-request gaps of >= 1s each
    assert!(
        elapsed >= Duration::from_secs(2),
        "crawl finished too fast: {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_cancellation_keeps_cache_consistent() {
    let server = MockServer::start().await;
    let base = server.uri();
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    let links: String = (1..=5)
        .map(|i| format!(r#"<a href="{}/guide/s{}">s{}</a>"#, base, i, i))
        .collect();
    mount_page(&server, "/guide", html_page("Hub", &format!("<p>Hub.</p>{}", links))).await;
    for i in 1..=5 {
        Mock::given(method("GET"))
            .and(path(format!("/guide/s{}", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(html_page("Slow", "<p>Slow body.</p>"))
                    .insert_header("content-type", "text/html")
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;
    }

    let config = test_config(tmp.path());
    let cache = SessionCache::new(&config.cache);
    let cancel = CancellationToken::new();

    let seed = format!("{}/guide", base);
    let crawl_cancel = cancel.clone();
    let crawl_handle =
        tokio::spawn(async move { crawl(config, &seed, CrawlOptions::default(), crawl_cancel).await });

    tokio::time::sleep(Duration::from_millis(700)).await;
    cancel.cancel();
    let report = crawl_handle.await.unwrap().unwrap();

    assert_eq!(report.status, SessionStatus::Failed);
    assert_eq!(report.failure_reason.as_deref(), Some("cancelled"));

    // Metadata agrees with what is actually on disk
    let metadata = cache.load_metadata(&report.session_id).unwrap();
    assert_eq!(metadata.status, SessionStatus::Failed);
    assert_eq!(
        metadata.failure_reason.as_deref(),
        Some("cancelled")
    );
    assert_eq!(
        metadata.pages_scraped,
        page_file_count(&cache, &report.session_id)
    );
    assert_eq!(metadata.pages_scraped, report.pages_scraped);
}

#[tokio::test]
async fn test_resume_is_idempotent_with_no_new_links() {
    let server = MockServer::start().await;
    let base = server.uri();
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(
        &server,
        "/guide",
        html_page(
            "Hub",
            &format!(r#"<p>Hub.</p><a href="{base}/guide/only">only</a>"#),
        ),
    )
    .await;
    mount_page(&server, "/guide/only", html_page("Only", "<p>Only body.</p>")).await;

    let config = test_config(tmp.path());
    let cache = SessionCache::new(&config.cache);

    let report = crawl(
        config.clone(),
        &format!("{}/guide", base),
        CrawlOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(report.status, SessionStatus::Completed);
    let pages_before = report.pages_scraped;
    let files_before = page_file_count(&cache, &report.session_id);

    // Simulate an interruption so the session is resumable
    cache
        .set_status(&report.session_id, SessionStatus::Failed, Some("cancelled"))
        .unwrap();

    let options = CrawlOptions {
        resume_session: Some(report.session_id.clone()),
        ..Default::default()
    };
    let resumed = crawl(
        config,
        &format!("{}/guide", base),
        options,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(resumed.status, SessionStatus::Completed);
    assert_eq!(resumed.pages_scraped, pages_before);
    assert_eq!(page_file_count(&cache, &report.session_id), files_before);
}

#[tokio::test]
async fn test_offsite_redirect_not_persisted() {
    let server = MockServer::start().await;
    let elsewhere = MockServer::start().await;
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/guide"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("location", format!("{}/landing", elsewhere.uri()).as_str()),
        )
        .mount(&server)
        .await;
    mount_page(&elsewhere, "/landing", html_page("Elsewhere", "<p>Other host.</p>")).await;

    let config = test_config(tmp.path());
    let cache = SessionCache::new(&config.cache);

    let report = crawl(
        config,
        &format!("{}/guide", server.uri()),
        CrawlOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    // The redirect was followed and read, but nothing was persisted
    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.pages_scraped, 0);
    assert_eq!(page_file_count(&cache, &report.session_id), 0);
}

#[tokio::test]
async fn test_robots_disallow_respected() {
    let server = MockServer::start().await;
    let base = server.uri();
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nDisallow: /guide/secret").await;
    mount_page(
        &server,
        "/guide",
        html_page(
            "Hub",
            &format!(
                r#"<p>Hub.</p><a href="{base}/guide/open">open</a>
                <a href="{base}/guide/secret">secret</a>"#
            ),
        ),
    )
    .await;
    mount_page(&server, "/guide/open", html_page("Open", "<p>Open body.</p>")).await;
    mount_page(&server, "/guide/secret", html_page("Secret", "<p>Hidden.</p>")).await;

    let config = test_config(tmp.path());
    let cache = SessionCache::new(&config.cache);

    let report = crawl(
        config,
        &format!("{}/guide", base),
        CrawlOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let urls = page_urls(&cache, &report.session_id);
    assert!(urls.iter().any(|u| u.ends_with("/guide/open")));
    assert!(!urls.iter().any(|u| u.ends_with("/guide/secret")));
}

#[tokio::test]
async fn test_unreachable_robots_is_permissive() {
    let server = MockServer::start().await;
    let base = server.uri();
    let tmp = TempDir::new().unwrap();

    // No robots.txt mock at all: wiremock returns 404, which is permissive
    mount_page(&server, "/guide", html_page("Hub", "<p>Hub body text.</p>")).await;

    let config = test_config(tmp.path());
    let report = crawl(
        config,
        &format!("{}/guide", base),
        CrawlOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.pages_scraped, 1);
}

#[tokio::test]
async fn test_exclude_patterns_applied() {
    let server = MockServer::start().await;
    let base = server.uri();
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(
        &server,
        "/guide",
        html_page(
            "Hub",
            &format!(
                r#"<p>Hub.</p><a href="{base}/guide/keep">keep</a>
                <a href="{base}/guide/drafts/wip">wip</a>"#
            ),
        ),
    )
    .await;
    mount_page(&server, "/guide/keep", html_page("Keep", "<p>Kept.</p>")).await;
    mount_page(&server, "/guide/drafts/wip", html_page("WIP", "<p>Draft.</p>")).await;

    let config = test_config(tmp.path());
    let cache = SessionCache::new(&config.cache);

    let options = CrawlOptions {
        exclude_patterns: vec!["/drafts/".to_string()],
        ..Default::default()
    };
    let report = crawl(
        config,
        &format!("{}/guide", base),
        options,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let urls = page_urls(&cache, &report.session_id);
    assert!(urls.iter().any(|u| u.ends_with("/guide/keep")));
    assert!(!urls.iter().any(|u| u.contains("/drafts/")));

    // Exclusions are recorded in the session metadata
    let metadata = cache.load_metadata(&report.session_id).unwrap();
    assert_eq!(metadata.exclude_patterns, vec!["/drafts/".to_string()]);
}

#[tokio::test]
async fn test_depth_limit_enforced() {
    let server = MockServer::start().await;
    let base = server.uri();
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    // A chain: /guide -> d1 -> d2 -> d3
    mount_page(
        &server,
        "/guide",
        html_page("Hub", &format!(r#"<p>Hub.</p><a href="{base}/guide/d1">d1</a>"#)),
    )
    .await;
    mount_page(
        &server,
        "/guide/d1",
        html_page("D1", &format!(r#"<p>One.</p><a href="{base}/guide/d1/d2">d2</a>"#)),
    )
    .await;
    mount_page(
        &server,
        "/guide/d1/d2",
        html_page("D2", &format!(r#"<p>Two.</p><a href="{base}/guide/d1/d2/d3">d3</a>"#)),
    )
    .await;
    mount_page(&server, "/guide/d1/d2/d3", html_page("D3", "<p>Three.</p>")).await;

    let mut config = test_config(tmp.path());
    config.crawling.max_depth = 2;
    let cache = SessionCache::new(&config.cache);

    let report = crawl(
        config,
        &format!("{}/guide", base),
        CrawlOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let urls = page_urls(&cache, &report.session_id);
    assert!(urls.iter().any(|u| u.ends_with("/d2")));
    assert!(!urls.iter().any(|u| u.ends_with("/d3")));

    let loaded = cache.load_session(&report.session_id).unwrap();
    assert!(loaded.records.iter().all(|r| r.depth <= 2));
}

#[tokio::test]
async fn test_preview_approved_set_restricts_crawl() {
    let server = MockServer::start().await;
    let base = server.uri();
    let tmp = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(
        &server,
        "/guide",
        html_page(
            "Hub",
            &format!(
                r#"<p>Hub.</p><a href="{base}/guide/yes">yes</a>
                <a href="{base}/guide/no">no</a>"#
            ),
        ),
    )
    .await;
    mount_page(&server, "/guide/yes", html_page("Yes", "<p>Approved.</p>")).await;
    mount_page(&server, "/guide/no", html_page("No", "<p>Not approved.</p>")).await;

    let config = test_config(tmp.path());
    let cache = SessionCache::new(&config.cache);

    let options = CrawlOptions {
        preview: Some(sitebinder::cache::PreviewSession {
            approved_urls: vec![
                format!("{}/guide", base),
                format!("{}/guide/yes", base),
            ],
            excluded_urls: vec![],
        }),
        ..Default::default()
    };

    let report = crawl(
        config,
        &format!("{}/guide", base),
        options,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let urls = page_urls(&cache, &report.session_id);
    assert!(urls.iter().any(|u| u.ends_with("/guide/yes")));
    assert!(!urls.iter().any(|u| u.ends_with("/guide/no")));
}
