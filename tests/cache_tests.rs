//! Cross-subsystem cache tests: sessions written by a crawl-shaped writer,
//! read back for export, surviving corruption and repair

use chrono::Utc;
use sitebinder::assemble::{presentable, Generator, MarkdownGenerator, OutputContext};
use sitebinder::cache::{
    doctor, PageMetadata, PageRecord, SessionCache, SessionStatus, FLAG_LOW_QUALITY,
    FLAG_PARSE_ERROR,
};
use sitebinder::config::Config;
use tempfile::TempDir;

fn record(n: usize, flags: Vec<String>) -> PageRecord {
    PageRecord {
        url: format!("https://docs.example.org/guide/p{}", n),
        final_url: format!("https://docs.example.org/guide/p{}", n),
        title: format!("Page {}", n),
        content: format!("<p>Content of page {}</p>", n),
        text_content: format!("Content of page {}", n),
        metadata: PageMetadata::default(),
        images: vec![],
        links: vec![],
        timestamp: Utc::now(),
        word_count: 4,
        content_type: "documentation".to_string(),
        flags,
        depth: 1,
    }
}

fn write_session(cache: &SessionCache, records: &[PageRecord]) -> String {
    let mut writer = cache
        .create_session("https://docs.example.org/guide/", "digest1234", &[])
        .unwrap();
    for r in records {
        writer.append_page(r).unwrap();
    }
    let id = writer.session_id().to_string();
    writer.mark_complete().unwrap();
    id
}

#[test]
fn test_session_to_markdown_export() {
    let tmp = TempDir::new().unwrap();
    let cache = SessionCache::at_root(tmp.path().join("cache"), true);

    let id = write_session(
        &cache,
        &[
            record(1, vec![]),
            record(2, vec![FLAG_LOW_QUALITY.to_string()]),
            record(3, vec![FLAG_PARSE_ERROR.to_string()]),
            record(4, vec![]),
        ],
    );

    let loaded = cache.load_session(&id).unwrap();
    assert_eq!(loaded.records.len(), 4);
    assert_eq!(loaded.metadata.pages_scraped, 4);

    // Low-quality pages drop out; parse-error stubs stay for placeholding
    let records = presentable(loaded.records);
    assert_eq!(records.len(), 3);

    let config = Config::default();
    let out_dir = tmp.path().join("out");
    let ctx = OutputContext {
        base_url: &loaded.metadata.base_url,
        config: &config,
        output_dir: &out_dir,
    };

    let paths = MarkdownGenerator.generate(&records, &ctx).unwrap();
    let body = std::fs::read_to_string(&paths[0]).unwrap();

    assert!(body.contains("Content of page 1"));
    assert!(!body.contains("Content of page 2"));
    assert!(body.contains("could not be extracted"));
    assert!(body.contains("Content of page 4"));
}

#[test]
fn test_corrupt_page_does_not_block_export() {
    let tmp = TempDir::new().unwrap();
    let cache = SessionCache::at_root(tmp.path().join("cache"), false);

    let id = write_session(&cache, &[record(1, vec![]), record(2, vec![]), record(3, vec![])]);

    // Truncate the middle page as if the process died mid-write
    std::fs::write(
        cache.session_dir(&id).join("pages").join("page_000002.json"),
        b"{\"url\": \"https://docs",
    )
    .unwrap();

    let loaded = cache.load_session(&id).unwrap();
    assert_eq!(loaded.records.len(), 2);
    assert_eq!(loaded.corrupt_pages, 1);

    // Doctor repairs the count; export proceeds from what is readable
    let report = doctor(&cache, true, false, 24).unwrap();
    assert!(report.repaired);
    assert_eq!(cache.load_metadata(&id).unwrap().pages_scraped, 2);

    let report = doctor(&cache, true, false, 24).unwrap();
    assert!(report.is_healthy());
}

#[test]
fn test_reader_sees_active_session_consistently() {
    let tmp = TempDir::new().unwrap();
    let cache = SessionCache::at_root(tmp.path().join("cache"), false);

    let mut writer = cache
        .create_session("https://docs.example.org/guide/", "digest1234", &[])
        .unwrap();
    writer.append_page(&record(1, vec![])).unwrap();
    writer.append_page(&record(2, vec![])).unwrap();

    // A concurrent reader snapshots mid-crawl and sees a consistent view
    let id = writer.session_id().to_string();
    let snapshot = cache.load_session(&id).unwrap();
    assert_eq!(snapshot.metadata.status, SessionStatus::Active);
    assert_eq!(snapshot.records.len(), snapshot.metadata.pages_scraped);

    // Later writes do not disturb the snapshot already taken
    writer.append_page(&record(3, vec![])).unwrap();
    assert_eq!(snapshot.records.len(), 2);

    writer.mark_complete().unwrap();
    let after = cache.load_session(&id).unwrap();
    assert_eq!(after.records.len(), 3);
}

#[test]
fn test_record_json_shape_on_disk() {
    let tmp = TempDir::new().unwrap();
    let cache = SessionCache::at_root(tmp.path().join("cache"), false);
    let id = write_session(&cache, &[record(1, vec![])]);

    let raw = std::fs::read(cache.session_dir(&id).join("pages").join("page_000001.json")).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();

    for key in [
        "url",
        "final_url",
        "title",
        "content",
        "text_content",
        "metadata",
        "images",
        "links",
        "timestamp",
        "word_count",
        "content_type",
        "flags",
    ] {
        assert!(value.get(key).is_some(), "page JSON missing key {}", key);
    }

    let meta_raw = std::fs::read(cache.session_dir(&id).join("session.json")).unwrap();
    let meta: serde_json::Value = serde_json::from_slice(&meta_raw).unwrap();
    for key in [
        "session_id",
        "base_url",
        "status",
        "created_at",
        "last_modified",
        "pages_scraped",
        "config_hash",
        "exclude_patterns",
        "cache_size",
    ] {
        assert!(meta.get(key).is_some(), "session JSON missing key {}", key);
    }
    assert_eq!(meta["status"], "completed");
}
