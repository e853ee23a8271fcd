use crate::cache::PreviewSession;
use crate::url::{ScopeGuard, ScopeVerdict};
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Why a candidate URL was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The admitted set already holds max_pages URLs
    PageLimit,

    /// Candidate depth exceeds max_depth
    DepthLimit,

    /// URL was already admitted this session
    Duplicate,

    /// An approved-URL set is in force and this URL is not in it
    NotApproved,

    /// An exclude pattern matched
    Excluded(String),

    /// The scope guard rejected it
    Scope(ScopeVerdict),

    /// robots.txt disallows it for our user agent
    Robots,
}

impl Rejection {
    /// Scope rejections are routine and stay quiet; the rest are worth a
    /// debug line
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Scope(_) | Self::Duplicate)
    }
}

/// Mutable admission state for one session
///
/// Holds the deduplication set, the optional preview allow-list, and the
/// exclude patterns. The decision ladder itself is pure: `screen` mutates
/// nothing, and only `commit` inserts into the admitted set.
pub struct AdmissionState {
    admitted: HashSet<String>,
    approved: Option<HashSet<String>>,
    exclude: Vec<Regex>,
    max_depth: u32,
    max_pages: usize,
}

impl AdmissionState {
    pub fn new(
        max_depth: u32,
        max_pages: usize,
        exclude_patterns: &[String],
    ) -> Result<Self, ConfigError> {
        let exclude = exclude_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| ConfigError::InvalidPattern(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            admitted: HashSet::new(),
            approved: None,
            exclude,
            max_depth,
            max_pages,
        })
    }

    /// Installs the approved/excluded URL sets from a preview artifact
    pub fn apply_preview(&mut self, preview: &PreviewSession) -> Result<(), ConfigError> {
        self.approved = Some(preview.approved_urls.iter().cloned().collect());
        for pattern in &preview.excluded_urls {
            // Excluded preview entries are literal URLs, not regexes
            self.exclude.push(
                Regex::new(&format!("^{}$", regex::escape(pattern)))
                    .map_err(|e| ConfigError::InvalidPattern(e.to_string()))?,
            );
        }
        Ok(())
    }

    /// Pre-seeds the admitted set; used when resuming a session
    pub fn preload<I: IntoIterator<Item = String>>(&mut self, urls: I) {
        self.admitted.extend(urls);
    }

    /// Runs the admission ladder up to (but not including) the robots check
    ///
    /// Decision order, first match wins: page limit, depth, duplicate,
    /// not-approved, exclude pattern, scope. The robots check is last and
    /// asynchronous, so the caller performs it between `screen` and
    /// `commit`.
    pub fn screen(&self, url: &Url, depth: u32, scope: &ScopeGuard) -> Result<(), Rejection> {
        if self.admitted.len() >= self.max_pages {
            return Err(Rejection::PageLimit);
        }

        if depth > self.max_depth {
            return Err(Rejection::DepthLimit);
        }

        let url_str = url.as_str();

        if self.admitted.contains(url_str) {
            return Err(Rejection::Duplicate);
        }

        if let Some(approved) = &self.approved {
            if !approved.contains(url_str) {
                return Err(Rejection::NotApproved);
            }
        }

        if let Some(pattern) = self.exclude.iter().find(|re| re.is_match(url_str)) {
            return Err(Rejection::Excluded(pattern.as_str().to_string()));
        }

        let verdict = scope.check(url);
        if !verdict.is_admissible() {
            return Err(Rejection::Scope(verdict));
        }

        Ok(())
    }

    /// Inserts a screened (and robots-cleared) URL into the admitted set
    ///
    /// Returns false if the URL raced in between screen and commit; callers
    /// treat that as a duplicate.
    pub fn commit(&mut self, url: &Url) -> bool {
        self.admitted.insert(url.as_str().to_string())
    }

    pub fn admitted_count(&self) -> usize {
        self.admitted.len()
    }

    pub fn is_admitted(&self, url: &Url) -> bool {
        self.admitted.contains(url.as_str())
    }
}
