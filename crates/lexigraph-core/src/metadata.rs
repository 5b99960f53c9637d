//! Source-metadata filtering.
//!
//! Retrieval results are filtered against the metadata of their originating
//! source document. Filters are evaluated both inside vector-store lookups
//! (where the backend supports pushdown) and as a post-filter by the
//! processing pipeline, so the predicate lives here rather than in either
//! store abstraction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A predicate over source metadata key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataFilter {
    /// Key equals value.
    Eq { key: String, value: String },
    /// Key does not equal value (missing keys match).
    Ne { key: String, value: String },
    /// Key's value starts with the given prefix.
    Prefix { key: String, value: String },
    /// All sub-filters match.
    And(Vec<MetadataFilter>),
    /// Any sub-filter matches.
    Or(Vec<MetadataFilter>),
}

impl MetadataFilter {
    /// Evaluate the predicate against a metadata dictionary.
    pub fn matches(&self, metadata: &BTreeMap<String, String>) -> bool {
        match self {
            MetadataFilter::Eq { key, value } => metadata.get(key) == Some(value),
            MetadataFilter::Ne { key, value } => metadata.get(key) != Some(value),
            MetadataFilter::Prefix { key, value } => metadata
                .get(key)
                .map(|v| v.starts_with(value.as_str()))
                .unwrap_or(false),
            MetadataFilter::And(filters) => filters.iter().all(|f| f.matches(metadata)),
            MetadataFilter::Or(filters) => filters.iter().any(|f| f.matches(metadata)),
        }
    }
}

/// Filter configuration applied to retrieval results.
///
/// An absent filter admits everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_filter: Option<MetadataFilter>,
}

impl FilterConfig {
    pub fn new(filter: MetadataFilter) -> Self {
        Self {
            source_filter: Some(filter),
        }
    }

    /// Check a source metadata dictionary against the configured filter.
    pub fn matches_source_metadata(&self, metadata: &BTreeMap<String, String>) -> bool {
        match &self.source_filter {
            Some(filter) => filter.matches(metadata),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_filter_admits_everything() {
        let config = FilterConfig::default();
        assert!(config.matches_source_metadata(&metadata(&[("a", "b")])));
        assert!(config.matches_source_metadata(&BTreeMap::new()));
    }

    #[test]
    fn eq_and_prefix() {
        let filter = MetadataFilter::And(vec![
            MetadataFilter::Eq {
                key: "lang".to_string(),
                value: "en".to_string(),
            },
            MetadataFilter::Prefix {
                key: "url".to_string(),
                value: "https://".to_string(),
            },
        ]);
        assert!(filter.matches(&metadata(&[("lang", "en"), ("url", "https://example.org")])));
        assert!(!filter.matches(&metadata(&[("lang", "de"), ("url", "https://example.org")])));
        assert!(!filter.matches(&metadata(&[("lang", "en")])));
    }

    #[test]
    fn ne_matches_missing_key() {
        let filter = MetadataFilter::Ne {
            key: "lang".to_string(),
            value: "en".to_string(),
        };
        assert!(filter.matches(&BTreeMap::new()));
        assert!(!filter.matches(&metadata(&[("lang", "en")])));
    }
}
