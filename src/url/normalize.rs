use crate::UrlError;
use url::Url;

/// Produces the canonical form of a URL
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase the host
/// 3. Normalize the path: collapse dot segments and duplicate slashes,
///    strip the trailing slash (except for the root `/`)
/// 4. Remove the fragment
/// 5. Remove tracking query keys (caller-supplied set; any `utm_*` key is
///    always stripped)
/// 6. Sort the remaining query pairs lexicographically by key
///
/// The scheme and any `www.` prefix are kept: the seed's literal host is the
/// crawl scope, and test servers speak plain HTTP.
///
/// # Arguments
///
/// * `url_str` - The URL string to canonicalize
/// * `tracking_params` - Query keys to strip
///
/// # Examples
///
/// ```
/// use sitebinder::url::canonicalize;
///
/// let url = canonicalize("https://EXAMPLE.com/guide/?b=2&a=1#intro", &[]).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/guide?a=1&b=2");
/// ```
pub fn canonicalize(url_str: &str, tracking_params: &[String]) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .ok_or(UrlError::MissingHost)?
        .to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(e.to_string()))?;

    let normalized = normalize_path(url.path());
    url.set_path(&normalized);

    url.set_fragment(None);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key, tracking_params))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));

        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = params
                .iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        k.clone()
                    } else {
                        format!("{}={}", k, v)
                    }
                })
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query));
        }
    }

    Ok(url)
}

/// Normalizes a URL path: collapses dot segments and duplicate slashes,
/// strips the trailing slash unless the path is the root
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

fn is_tracking_param(key: &str, tracking_params: &[String]) -> bool {
    key.starts_with("utm_") || tracking_params.iter().any(|p| p == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_tracking() -> Vec<String> {
        crate::config::CrawlingConfig::default().tracking_params
    }

    #[test]
    fn test_lowercase_host() {
        let url = canonicalize("https://DOCS.Example.ORG/Guide", &[]).unwrap();
        assert_eq!(url.as_str(), "https://docs.example.org/Guide");
    }

    #[test]
    fn test_keeps_scheme_and_www() {
        let url = canonicalize("http://www.example.com/page", &[]).unwrap();
        assert_eq!(url.as_str(), "http://www.example.com/page");
    }

    #[test]
    fn test_strip_fragment() {
        let url = canonicalize("https://example.com/page#section-2", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_trailing_slash_removed() {
        let url = canonicalize("https://example.com/guide/", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/guide");
    }

    #[test]
    fn test_root_slash_kept() {
        let url = canonicalize("https://example.com/", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_dot_segments_collapsed() {
        let url = canonicalize("https://example.com/a/../b/./c", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_duplicate_slashes_collapsed() {
        let url = canonicalize("https://example.com//guide///intro", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/guide/intro");
    }

    #[test]
    fn test_query_sorted() {
        let url = canonicalize("https://example.com/p?z=1&a=2&m=3", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/p?a=2&m=3&z=1");
    }

    #[test]
    fn test_tracking_params_removed() {
        let url = canonicalize(
            "https://example.com/p?utm_source=x&keep=yes&fbclid=abc",
            &default_tracking(),
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/p?keep=yes");
    }

    #[test]
    fn test_utm_always_stripped() {
        // Even with an empty tracking set, utm_* keys go away
        let url = canonicalize("https://example.com/p?utm_custom=1&a=b", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/p?a=b");
    }

    #[test]
    fn test_all_tracking_removed_drops_query() {
        let url =
            canonicalize("https://example.com/p?utm_source=a&gclid=b", &default_tracking()).unwrap();
        assert_eq!(url.as_str(), "https://example.com/p");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_invalid_scheme_rejected() {
        assert!(matches!(
            canonicalize("ftp://example.com/file", &[]),
            Err(UrlError::InvalidScheme(_))
        ));
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(canonicalize("definitely not a url", &[]).is_err());
    }

    #[test]
    fn test_canonical_is_idempotent() {
        let tracking = default_tracking();
        let once = canonicalize(
            "https://Example.com/a/../guide/?b=2&a=1&utm_source=x#frag",
            &tracking,
        )
        .unwrap();
        let twice = canonicalize(once.as_str(), &tracking).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_path_edge_cases() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/../x"), "/x");
        assert_eq!(normalize_path("/a/b/"), "/a/b");
    }
}
