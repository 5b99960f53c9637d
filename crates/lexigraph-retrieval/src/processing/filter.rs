//! Metadata post-filter.

use async_trait::async_trait;

use lexigraph_core::metadata::FilterConfig;
use lexigraph_core::model::{SearchQuery, SearchResultCollection};

use super::{retain_results, Processor};

/// Drops results whose source metadata fails the configured predicate.
///
/// Vector backends that support pushdown already applied the filter at
/// lookup time; this stage covers results that arrived through graph
/// traversal.
pub struct FilterByMetadata {
    filter_config: FilterConfig,
}

impl FilterByMetadata {
    pub fn new(filter_config: FilterConfig) -> Self {
        Self { filter_config }
    }
}

#[async_trait]
impl Processor for FilterByMetadata {
    fn name(&self) -> &'static str {
        "FilterByMetadata"
    }

    async fn process(
        &self,
        collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        retain_results(collection, |_, result| {
            let matches = result
                .source
                .metadata()
                .map(|metadata| self.filter_config.matches_source_metadata(metadata))
                .unwrap_or(true);
            matches.then_some(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use lexigraph_core::metadata::MetadataFilter;

    #[tokio::test]
    async fn non_matching_sources_are_dropped() {
        let input = collection(vec![
            result("src1", vec![topic("T", vec![statement("s1", "a", 1.0)])], None),
            result("src2", vec![topic("T", vec![statement("s2", "b", 1.0)])], None),
        ]);
        let filter = FilterByMetadata::new(FilterConfig::new(MetadataFilter::Eq {
            key: "title".to_string(),
            value: "Title src1".to_string(),
        }));

        let output = filter.process(input, &SearchQuery::new("q")).await;
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].source.key(), "src1");
    }

    #[tokio::test]
    async fn absent_filter_admits_everything() {
        let input = collection(vec![result(
            "src1",
            vec![topic("T", vec![statement("s1", "a", 1.0)])],
            None,
        )]);
        let filter = FilterByMetadata::new(FilterConfig::default());
        let output = filter.process(input, &SearchQuery::new("q")).await;
        assert_eq!(output.results.len(), 1);
    }
}
