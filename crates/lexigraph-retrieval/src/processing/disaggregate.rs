//! Topic disaggregation.

use async_trait::async_trait;

use lexigraph_core::model::{SearchQuery, SearchResult, SearchResultCollection};

use super::Processor;

/// Splits every multi-topic result into one result per topic so topics
/// are scored independently downstream. Each split result is scored by
/// its topic's best statement.
pub struct DisaggregateResults;

#[async_trait]
impl Processor for DisaggregateResults {
    fn name(&self) -> &'static str {
        "DisaggregateResults"
    }

    async fn process(
        &self,
        collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        let mut disaggregated: Vec<SearchResult> = Vec::new();
        for result in &collection.results {
            for topic in &result.topics {
                let score = topic
                    .statements
                    .iter()
                    .map(|s| s.score)
                    .fold(f64::MIN, f64::max);
                if topic.statements.is_empty() {
                    continue;
                }
                disaggregated.push(SearchResult {
                    source: result.source.clone(),
                    topics: vec![topic.clone()],
                    score: Some(score),
                    ..Default::default()
                });
            }
        }
        collection.with_new_results(disaggregated)
    }
}
