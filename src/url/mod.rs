//! URL handling module for Recipe-Ingest
//!
//! This module provides URL normalization (the identity used for
//! fingerprints) and recipe/category link classification.

mod classify;
mod normalize;

pub use classify::{
    LinkKind, UrlClassifier, UrlPatterns, DEFAULT_CATEGORY_MARKERS, DEFAULT_RECIPE_MARKERS,
    EXCLUDED_MARKERS,
};
pub use normalize::normalize_url;

use url::Url;

/// Returns true if both URLs are served by the same host (port included)
pub fn same_site(a: &Url, b: &Url) -> bool {
    let host = |u: &Url| {
        u.host_str()
            .map(|h| h.trim_start_matches("www.").to_lowercase())
    };
    host(a) == host(b) && a.port_or_known_default() == b.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_site() {
        let a = Url::parse("https://www.example.com/recipe/a").unwrap();
        let b = Url::parse("https://example.com/category/b").unwrap();
        let c = Url::parse("https://other.com/recipe/a").unwrap();
        let d = Url::parse("https://example.com:8443/recipe/a").unwrap();

        assert!(same_site(&a, &b));
        assert!(!same_site(&a, &c));
        assert!(!same_site(&a, &d));
    }
}
