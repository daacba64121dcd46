//! Resource identity for dataset bundle urls.
//!
//! A bundle url looks like `<base>/<digits>[-<lang>].<ext>[?query]`, e.g.
//! `https://www150.statcan.gc.ca/n1/tbl/csv/23100274-eng.zip`. The English and
//! French bundles of one table, and any query-string variants, resolve to the
//! same [`ResourceId`] so they share one cache entry.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::UrlFormatError;

/// `<digits>[-<3-letter language>].<extension>`, matched against the file name only.
static BUNDLE_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)(?:-([A-Za-z]{3}))?\.(\w+)$").expect("bundle file regex is valid")
});

/// Canonical, language- and query-invariant identity of a dataset.
///
/// Equality and hashing use the numeric product id only; `canonical` keeps
/// the `<base><digits>` form for display.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceId {
    canonical: String,
    product_id: String,
}

impl ResourceId {
    /// `<base><digits>`, e.g. `https://www150.statcan.gc.ca/n1/tbl/csv/23100274`.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The numeric product id, e.g. `23100274`.
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Directory-safe cache key.
    pub fn cache_key(&self) -> &str {
        &self.product_id
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.product_id == other.product_id
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.product_id.hash(state);
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// A parsed dataset bundle url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceUrl {
    /// The locator exactly as given.
    pub locator: String,
    /// Everything before the file name, including the trailing `/`.
    pub base: String,
    /// File name without query, e.g. `23100274-eng.zip`.
    pub file: String,
    /// Numeric product id.
    pub product_id: String,
    /// Language suffix (`eng`, `fra`) if present.
    pub language: Option<String>,
    /// Extension, e.g. `zip`.
    pub extension: String,
    /// Expected data file inside the bundle: `<id>.csv`.
    pub data_file: String,
    /// Expected metadata file inside the bundle: `<id>_MetaData.csv`.
    pub metadata_file: String,
}

impl ResourceUrl {
    /// Parse a locator. Query parameters and fragments are ignored for identity.
    pub fn parse(locator: &str) -> Result<Self, UrlFormatError> {
        let path = locator
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let (base, file) = match path.rfind('/') {
            Some(pos) => path.split_at(pos + 1),
            None => ("", path),
        };

        let caps = BUNDLE_FILE_RE
            .captures(file)
            .ok_or_else(|| UrlFormatError(locator.to_string()))?;

        let product_id = caps[1].to_string();
        let language = caps.get(2).map(|m| m.as_str().to_lowercase());
        let extension = caps[3].to_string();

        Ok(Self {
            locator: locator.to_string(),
            base: base.to_string(),
            file: file.to_string(),
            data_file: format!("{}.csv", product_id),
            metadata_file: format!("{}_MetaData.csv", product_id),
            product_id,
            language,
            extension,
        })
    }

    /// The language-invariant identity of this url.
    pub fn id(&self) -> ResourceId {
        ResourceId {
            canonical: format!("{}{}", self.base, self.product_id),
            product_id: self.product_id.clone(),
        }
    }

    /// Shorthand for `self.id().to_string()`.
    pub fn canonical_id(&self) -> String {
        format!("{}{}", self.base, self.product_id)
    }
}

impl FromStr for ResourceUrl {
    type Err = UrlFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const RAIL: &str = "https://www150.statcan.gc.ca/n1/tbl/csv/23100274-eng.zip";

    #[test]
    fn test_parse_zip_url() {
        let url = ResourceUrl::parse(RAIL).unwrap();
        assert_eq!(url.language.as_deref(), Some("eng"));
        assert_eq!(url.file, "23100274-eng.zip");
        assert_eq!(url.extension, "zip");
        assert_eq!(url.data_file, "23100274.csv");
        assert_eq!(url.metadata_file, "23100274_MetaData.csv");
        assert_eq!(url.base, "https://www150.statcan.gc.ca/n1/tbl/csv/");
    }

    #[test]
    fn test_parse_without_language() {
        let url = ResourceUrl::parse("https://www150.statcan.gc.ca/n1/tbl/csv/23100274.zip").unwrap();
        assert!(url.language.is_none());
        assert_eq!(url.product_id, "23100274");
    }

    #[test]
    fn test_canonical_id() {
        let url = ResourceUrl::parse(RAIL).unwrap();
        assert_eq!(url.canonical_id(), "https://www150.statcan.gc.ca/n1/tbl/csv/23100274");
        assert_eq!(url.id().to_string(), url.canonical_id());
    }

    #[test]
    fn test_language_and_query_invariance() {
        let eng = ResourceUrl::parse(RAIL).unwrap();
        let fra = ResourceUrl::parse("https://www150.statcan.gc.ca/n1/tbl/csv/23100274-fra.zip").unwrap();
        let query = ResourceUrl::parse("https://www150.statcan.gc.ca/n1/tbl/csv/23100274-eng.zip?st=yQYQGvmD").unwrap();

        assert_eq!(eng.canonical_id(), fra.canonical_id());
        assert_eq!(eng.canonical_id(), query.canonical_id());
        assert_eq!(eng.id(), query.id());

        let ids: HashSet<ResourceId> = [eng.id(), fra.id(), query.id()].into_iter().collect();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_different_ids_are_distinct() {
        let rail = ResourceUrl::parse(RAIL).unwrap();
        let other = ResourceUrl::parse("https://www150.statcan.gc.ca/n1/tbl/csv/25100055-eng.zip").unwrap();
        assert_ne!(rail.canonical_id(), other.canonical_id());
        assert_ne!(rail.id(), other.id());
    }

    #[test]
    fn test_query_is_ignored() {
        let url = ResourceUrl::parse("https://www150.statcan.gc.ca/n1/en/tbl/csv/38100092-eng.zip?st=yQYQGvmD").unwrap();
        assert_eq!(url.product_id, "38100092");
        assert_eq!(url.file, "38100092-eng.zip");
    }

    #[test]
    fn test_rejects_non_bundle_locators() {
        for bad in ["notazip", "https://example.com/data/", "https://example.com/abc-eng.zip", "https://example.com/123-english.zip"] {
            let err = ResourceUrl::parse(bad).unwrap_err();
            assert_eq!(err.0, bad);
        }
    }
}
