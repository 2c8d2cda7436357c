use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A same-origin location normalized to `path[?query]`.
///
/// The fragment is dropped, query parameters keep the order the application
/// emitted them in, and trailing slashes are trimmed everywhere but the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PagePath(String);

impl PagePath {
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Normalizes an absolute URL. Returns `None` when it leaves `base`'s origin.
    pub fn from_url(url: &Url, base: &Url) -> Option<Self> {
        if url.origin() != base.origin() {
            return None;
        }
        Some(Self::from_parts(url.path(), url.query()))
    }

    /// Resolves `raw` (absolute or relative) against `base` and normalizes it.
    pub fn resolve(raw: &str, base: &Url) -> Option<Self> {
        let joined = base.join(raw).ok()?;
        Self::from_url(&joined, base)
    }

    fn from_parts(path: &str, query: Option<&str>) -> Self {
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { "/" } else { trimmed };
        match query {
            Some(q) if !q.is_empty() => Self(format!("{}?{}", path, q)),
            _ => Self(path.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path without its query string.
    pub fn path_only(&self) -> &str {
        self.0.split('?').next().unwrap_or("/")
    }

    /// Absolute URL for this path under `base`.
    pub fn to_url(&self, base: &Url) -> Result<Url> {
        base.join(&self.0)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", self.0, e)))
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a raw URL string against `base`, falling back to the raw value.
pub fn normalize_url_path(url: &str, base: &Url) -> String {
    PagePath::resolve(url, base)
        .map(PagePath::into_string)
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:3000").unwrap()
    }

    #[test]
    fn test_root_stays_root() {
        assert_eq!(PagePath::resolve("/", &base()).unwrap().as_str(), "/");
        assert_eq!(
            PagePath::resolve("http://localhost:3000", &base()).unwrap().as_str(),
            "/"
        );
    }

    #[test]
    fn test_trailing_slash_and_fragment_removed() {
        let path = PagePath::resolve("/vendor/dashboard/#stats", &base()).unwrap();
        assert_eq!(path.as_str(), "/vendor/dashboard");
    }

    #[test]
    fn test_query_order_preserved() {
        let path = PagePath::resolve("/search?z=1&a=2", &base()).unwrap();
        assert_eq!(path.as_str(), "/search?z=1&a=2");
        assert_eq!(path.path_only(), "/search");
    }

    #[test]
    fn test_cross_origin_rejected() {
        assert!(PagePath::resolve("https://example.com/about", &base()).is_none());
        assert!(PagePath::resolve("http://localhost:4000/about", &base()).is_none());
    }

    #[test]
    fn test_normalize_url_path_falls_back_to_raw() {
        assert_eq!(normalize_url_path("/help/", &base()), "/help");
        assert_eq!(
            normalize_url_path("https://elsewhere.dev/x", &base()),
            "https://elsewhere.dev/x"
        );
    }
}
