use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flag set on records that fall below the content-length floor
pub const FLAG_LOW_QUALITY: &str = "low-quality";

/// Flag set on stub records emitted after an extraction failure
pub const FLAG_PARSE_ERROR: &str = "parse-error";

/// Lifecycle status of a cache session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Being written by a crawl
    Active,

    /// Crawl finished normally
    Completed,

    /// Crawl aborted (error or cancellation)
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal statuses accept no further page writes
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session-level metadata, persisted as `session.json`
///
/// Rewritten atomically on every page commit and on each status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub base_url: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub pages_scraped: usize,
    pub config_hash: String,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Total bytes of page files written so far
    pub cache_size: u64,
    /// Populated when status is failed, e.g. "cancelled"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SessionMetadata {
    /// Field names every readable session.json must carry; used by doctor
    pub const REQUIRED_FIELDS: &'static [&'static str] = &[
        "session_id",
        "base_url",
        "status",
        "created_at",
        "last_modified",
        "pages_scraped",
        "config_hash",
        "cache_size",
    ];
}

/// Per-page metadata pulled from `<meta>` tags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub author: String,
}

/// One image referenced by a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Absolute source URL
    pub src: String,

    /// Where the downloaded body lives, when image fetching is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,

    #[serde(default)]
    pub alt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// One archived page, persisted as `pages/page_NNNNNN.json[.gz]`
///
/// Immutable once written. `url` is the canonical URL that was admitted;
/// `final_url` records where redirects actually landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub final_url: String,
    pub title: String,
    /// Cleaned HTML of the selected main content
    pub content: String,
    pub text_content: String,
    #[serde(default)]
    pub metadata: PageMetadata,
    #[serde(default)]
    pub images: Vec<ImageDescriptor>,
    #[serde(default)]
    pub links: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub word_count: usize,
    /// Classification string, see `ContentKind::as_str`
    pub content_type: String,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Link depth from the seed; lets resume rebuild the frontier with the
    /// same depth budget
    #[serde(default)]
    pub depth: u32,
}

impl PageRecord {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// Whether the assembler should include this record in outputs
    pub fn is_presentable(&self) -> bool {
        !self.has_flag(FLAG_PARSE_ERROR)
    }
}

/// Approved/excluded URL sets produced by an external preview step
///
/// Consumed read-only by admission to pre-seed its allow/deny lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewSession {
    #[serde(default)]
    pub approved_urls: Vec<String>,
    #[serde(default)]
    pub excluded_urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> PageRecord {
        PageRecord {
            url: "https://example.org/guide".to_string(),
            final_url: "https://example.org/guide".to_string(),
            title: "Guide".to_string(),
            content: "<h1>Guide</h1>".to_string(),
            text_content: "Guide".to_string(),
            metadata: PageMetadata::default(),
            images: vec![],
            links: vec![],
            timestamp: Utc::now(),
            word_count: 1,
            content_type: "documentation".to_string(),
            flags: vec![],
            depth: 0,
        }
    }

    #[test]
    fn test_status_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Active).unwrap(),
            "\"active\""
        );
        let parsed: SessionStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, SessionStatus::Completed);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_record_roundtrip() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: PageRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.url, record.url);
        assert_eq!(back.word_count, record.word_count);
    }

    #[test]
    fn test_record_required_keys_present() {
        let json = serde_json::to_value(sample_record()).unwrap();
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
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
    }

    #[test]
    fn test_flags() {
        let mut record = sample_record();
        assert!(record.is_presentable());
        record.flags.push(FLAG_PARSE_ERROR.to_string());
        assert!(record.has_flag(FLAG_PARSE_ERROR));
        assert!(!record.is_presentable());
    }

    #[test]
    fn test_image_descriptor_optional_fields_omitted() {
        let descriptor = ImageDescriptor {
            src: "https://example.org/pic.png".to_string(),
            local_path: None,
            alt: "a picture".to_string(),
            title: None,
            caption: None,
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(!json.contains("local_path"));
        assert!(!json.contains("caption"));
    }

    #[test]
    fn test_preview_session_parses_minimal_json() {
        let preview: PreviewSession =
            serde_json::from_str(r#"{"approved_urls": ["https://a/b"]}"#).unwrap();
        assert_eq!(preview.approved_urls.len(), 1);
        assert!(preview.excluded_urls.is_empty());
    }
}
