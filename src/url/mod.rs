//! URL handling module
//!
//! Canonicalization (fragment/query/trailing-slash normalization) and the
//! path-scope guard that decides whether a candidate URL belongs to the
//! owner-scoped subgraph being archived.

mod normalize;
mod scope;

pub use normalize::{canonicalize, normalize_path};
pub use scope::{ScopeGuard, ScopeVerdict, SeedContext};

use crate::UrlError;
use url::Url;

/// Extracts the host from a URL string
///
/// # Arguments
///
/// * `url_str` - The URL to extract the host from
///
/// # Returns
///
/// * `Ok(String)` - The lowercased host
/// * `Err(UrlError)` - The URL is malformed or has no host
pub fn extract_host(url_str: &str) -> Result<String, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    url.host_str()
        .map(|h| h.to_lowercase())
        .ok_or(UrlError::MissingHost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host() {
        assert_eq!(
            extract_host("https://Docs.Example.org/guide/").unwrap(),
            "docs.example.org"
        );
    }

    #[test]
    fn test_extract_host_missing() {
        assert!(extract_host("data:text/plain,hi").is_err());
        assert!(extract_host("not a url").is_err());
    }
}
