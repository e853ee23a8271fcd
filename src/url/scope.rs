use crate::config::{NavigationPolicy, PathScopingConfig};
use crate::url::normalize_path;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Path patterns that are never archived: site machinery, administrative
/// surfaces, and static assets other than images.
static TECHNICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(^|/)(login|logout|signin|signup|sign-in|sign-up|register|auth|password)(/|$)",
        r"(?i)(^|/)(admin|wp-admin|dashboard|account|profile|settings)(/|$)",
        r"(?i)(^|/)(api|ajax|graphql|rest|wp-json|cgi-bin)(/|$)",
        r"(?i)(^|/)xmlrpc(\.php)?(/|$)",
        r"(?i)(^|/)(feed|rss|atom)(/|$)",
        r"(?i)\.(rss|atom)$",
        r"(?i)\.(css|js|mjs|map|json|xml|woff2?|ttf|eot|otf)$",
        r"(?i)\.(zip|gz|tar|7z|rar|exe|dmg|pkg|msi)$",
        r"(?i)\.(mp4|webm|avi|mov|wmv|mp3|wav|ogg|flac)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid technical pattern"))
    .collect()
});

/// The crawl scope derived from the seed URL at session start
///
/// Immutable for the lifetime of a session; the config digest ties cached
/// sessions to the admission-relevant configuration.
#[derive(Debug, Clone)]
pub struct SeedContext {
    /// Canonical seed URL
    pub base_url: Url,

    /// Host every in-scope URL must match (when same_host_only is set)
    pub host: String,

    /// Normalized path of the seed URL
    pub seed_path: String,

    /// Path-scoping policy for this session
    pub scoping: PathScopingConfig,

    /// Digest of the scrape-relevant configuration
    pub config_digest: String,
}

impl SeedContext {
    /// Creates a seed context from a canonical seed URL
    pub fn new(base_url: Url, scoping: PathScopingConfig, config_digest: String) -> Self {
        let host = base_url.host_str().unwrap_or_default().to_lowercase();
        let seed_path = normalize_path(base_url.path());
        Self {
            base_url,
            host,
            seed_path,
            scoping,
            config_digest,
        }
    }
}

/// Verdict of a scope check for a candidate URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeVerdict {
    /// Candidate path is the seed path or a descendant of it
    InScope,

    /// Candidate is the site root, admitted via allow_homepage
    HomepageAllowed,

    /// Candidate is an ancestor of the seed path within allow_parent_levels
    ParentAllowed,

    /// Candidate shares the seed path's immediate parent
    SiblingAllowed,

    /// Candidate path matches an administrative/machinery pattern
    BlockedTechnical,

    /// Candidate is outside the configured scope
    OutOfScope,
}

impl ScopeVerdict {
    /// Whether this verdict lets the URL proceed to admission
    pub fn is_admissible(&self) -> bool {
        !matches!(self, Self::BlockedTechnical | Self::OutOfScope)
    }
}

/// Decides whether candidate URLs fall inside the seed's scope
///
/// Pure with respect to `(URL, SeedContext)`: the guard holds no mutable
/// state, so verdicts are reproducible for property tests.
#[derive(Debug, Clone)]
pub struct ScopeGuard {
    seed: SeedContext,
}

impl ScopeGuard {
    pub fn new(seed: SeedContext) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> &SeedContext {
        &self.seed
    }

    /// Checks a candidate URL against the scope policy
    ///
    /// Tie-breaks: blocked-technical wins over every allow toggle, and the
    /// homepage allowance applies only to the exact root path.
    pub fn check(&self, candidate: &Url) -> ScopeVerdict {
        let path = normalize_path(candidate.path());

        if is_technical_path(&path) {
            return ScopeVerdict::BlockedTechnical;
        }

        let scoping = &self.seed.scoping;
        let same_host = candidate
            .host_str()
            .map(|h| h.eq_ignore_ascii_case(&self.seed.host))
            .unwrap_or(false);

        if scoping.same_host_only && !same_host {
            return ScopeVerdict::OutOfScope;
        }

        if !scoping.enabled {
            return ScopeVerdict::InScope;
        }

        if is_descendant(&path, &self.seed.seed_path) {
            return ScopeVerdict::InScope;
        }

        // Everything below is a navigation allowance; the navigation policy
        // can switch them all off at once.
        if scoping.allow_navigation == NavigationPolicy::None {
            return ScopeVerdict::OutOfScope;
        }

        if path == "/" {
            return if scoping.allow_homepage {
                ScopeVerdict::HomepageAllowed
            } else {
                ScopeVerdict::OutOfScope
            };
        }

        if self
            .ancestors_within_limit()
            .any(|ancestor| ancestor == path)
        {
            return ScopeVerdict::ParentAllowed;
        }

        if scoping.allow_siblings {
            if let Some(parent) = parent_path(&self.seed.seed_path) {
                if parent != "/" && is_descendant(&path, &parent) {
                    return ScopeVerdict::SiblingAllowed;
                }
            }
        }

        ScopeVerdict::OutOfScope
    }

    /// Ancestor paths of the seed path, nearest first, capped at
    /// allow_parent_levels. The root is excluded; it is governed by
    /// allow_homepage.
    fn ancestors_within_limit(&self) -> impl Iterator<Item = String> + '_ {
        let mut ancestors = Vec::new();
        let mut current = self.seed.seed_path.clone();

        for _ in 0..self.seed.scoping.allow_parent_levels {
            match parent_path(&current) {
                Some(parent) if parent != "/" => {
                    ancestors.push(parent.clone());
                    current = parent;
                }
                _ => break,
            }
        }

        ancestors.into_iter()
    }
}

fn is_technical_path(path: &str) -> bool {
    TECHNICAL_PATTERNS.iter().any(|re| re.is_match(path))
}

/// True when `path` equals `base` or lies strictly below it
fn is_descendant(path: &str, base: &str) -> bool {
    if base == "/" {
        return true;
    }
    path == base || path.starts_with(&format!("{}/", base))
}

/// The immediate parent of a normalized path, or None for the root
fn parent_path(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}
