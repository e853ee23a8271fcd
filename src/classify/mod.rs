//! Content classification for crawl prioritization and quality gating
//!
//! URLs are classified from their path alone so that the frontier can be
//! prioritized before fetching; fetched pages are additionally analyzed for
//! structural quality (word count, headings, text/link ratio).

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::fmt;
use url::Url;

static DOCUMENTATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"/docs?(/|$)",
        r"/documentation(/|$)",
        r"/help(/|$)",
        r"/guide(/|$)",
        r"/tutorial(/|$)",
        r"/manual(/|$)",
        r"/reference(/|$)",
        r"/getting-started(/|$)",
        r"/how-to(/|$)",
        r"/faq(/|$)",
        r"/knowledge-base(/|$)",
        r"/wiki(/|$)",
    ])
});

static CONTENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"/about(/|$)",
        r"/features(/|$)",
        r"/blog(/|$)",
        r"/news(/|$)",
        r"/articles?(/|$)",
        r"/posts?(/|$)",
        r"/case-studies(/|$)",
        r"/showcase(/|$)",
        r"/services(/|$)",
        r"/products(/|$)",
        r"/solutions(/|$)",
    ])
});

static NAVIGATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"^/$",
        r"/index\.(html?|php)$",
        r"/home/?$",
        r"/main/?$",
        r"/sitemap(\.(xml|html))?$",
    ])
});

static EXCLUDED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"/cart(/|$)",
        r"/checkout(/|$)",
        r"/orders?(/|$)",
        r"/payment(/|$)",
        r"/subscribe(/|$)",
        r"/unsubscribe(/|$)",
        r"/upload(/|$)",
        r"/download(/|$)",
        r"/(create|edit|delete)(/|$)",
        r"\.pdf$",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).expect("invalid classifier pattern"))
        .collect()
}

/// Kind of content a page holds, derived from its URL and structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// Guides, manuals, references
    Documentation,

    /// Articles, marketing pages, general prose
    Content,

    /// Index and hub pages
    Navigation,

    /// Dynamic or machine-oriented endpoints
    Technical,

    /// Pages below the quality gate
    LowQuality,

    /// Pages matching exclusion patterns
    Excluded,
}

impl ContentKind {
    /// Frontier priority for this kind; higher values are fetched first
    pub fn priority(&self) -> u32 {
        match self {
            Self::Documentation => 100,
            Self::Content => 80,
            Self::Navigation => 60,
            Self::Technical => 20,
            Self::LowQuality | Self::Excluded => 0,
        }
    }

    /// Stable string form, used in PageRecord.content_type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Documentation => "documentation",
            Self::Content => "content",
            Self::Navigation => "navigation",
            Self::Technical => "technical",
            Self::LowQuality => "low-quality",
            Self::Excluded => "excluded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "documentation" => Some(Self::Documentation),
            "content" => Some(Self::Content),
            "navigation" => Some(Self::Navigation),
            "technical" => Some(Self::Technical),
            "low-quality" => Some(Self::LowQuality),
            "excluded" => Some(Self::Excluded),
            _ => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies a URL from its path and query, without fetching it
///
/// Exclusion patterns are checked first, then documentation, navigation, and
/// content patterns. URLs with machine-oriented query keys (id, page, sort,
/// filter, search, q, action) classify as technical. Everything else is
/// plain content.
pub fn classify_url(url: &Url) -> ContentKind {
    let path = url.path().to_lowercase();

    if EXCLUDED_PATTERNS.iter().any(|re| re.is_match(&path)) {
        return ContentKind::Excluded;
    }

    if DOCUMENTATION_PATTERNS.iter().any(|re| re.is_match(&path)) {
        return ContentKind::Documentation;
    }

    if NAVIGATION_PATTERNS.iter().any(|re| re.is_match(&path)) {
        return ContentKind::Navigation;
    }

    if CONTENT_PATTERNS.iter().any(|re| re.is_match(&path)) {
        return ContentKind::Content;
    }

    const TECHNICAL_KEYS: &[&str] = &["id", "page", "sort", "filter", "search", "q", "action"];
    if url
        .query_pairs()
        .any(|(key, _)| TECHNICAL_KEYS.contains(&key.as_ref()))
    {
        return ContentKind::Technical;
    }

    ContentKind::Content
}

/// Structural metrics of a fetched page
#[derive(Debug, Clone, Default)]
pub struct PageStructure {
    pub word_count: usize,
    pub heading_count: usize,
    pub paragraph_count: usize,
    pub list_count: usize,
    pub link_count: usize,
    pub image_count: usize,
    /// Characters of visible text
    pub text_len: usize,
    /// Characters of visible text inside anchors
    pub link_text_len: usize,
}

impl PageStructure {
    /// Ratio of anchor text to all text; high values suggest link farms
    /// and navigation hubs
    pub fn link_text_ratio(&self) -> f64 {
        if self.text_len == 0 {
            return 0.0;
        }
        self.link_text_len as f64 / self.text_len as f64
    }
}

/// Measures the structural quality signals of an HTML document
pub fn analyze_structure(html: &str) -> PageStructure {
    let document = Html::parse_document(html);

    let heading_sel = Selector::parse("h1, h2, h3, h4, h5, h6").expect("static selector");
    let paragraph_sel = Selector::parse("p").expect("static selector");
    let list_sel = Selector::parse("ul, ol").expect("static selector");
    let link_sel = Selector::parse("a").expect("static selector");
    let image_sel = Selector::parse("img").expect("static selector");
    let body_sel = Selector::parse("body").expect("static selector");

    let text: String = document
        .select(&body_sel)
        .next()
        .map(|body| body.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let link_text_len: usize = document
        .select(&link_sel)
        .map(|a| a.text().map(str::len).sum::<usize>())
        .sum();

    PageStructure {
        word_count: text.split_whitespace().count(),
        heading_count: document.select(&heading_sel).count(),
        paragraph_count: document.select(&paragraph_sel).count(),
        list_count: document.select(&list_sel).count(),
        link_count: document.select(&link_sel).count(),
        image_count: document.select(&image_sel).count(),
        text_len: text.len(),
        link_text_len,
    }
}

/// Refines a URL classification with post-fetch structural evidence
///
/// A page below the configured word-count floor is low-quality regardless of
/// its URL; a page whose text is almost entirely link text reads as
/// navigation.
pub fn refine_kind(kind: ContentKind, structure: &PageStructure, min_words: usize) -> ContentKind {
    if structure.word_count < min_words {
        return ContentKind::LowQuality;
    }

    if kind == ContentKind::Content
        && structure.link_count > 20
        && structure.link_text_ratio() > 0.8
    {
        return ContentKind::Navigation;
    }

    kind
}
