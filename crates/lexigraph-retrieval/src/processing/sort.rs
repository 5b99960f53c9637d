//! Result ordering.

use async_trait::async_trait;

use lexigraph_core::model::{SearchQuery, SearchResultCollection};

use super::Processor;

/// Orders results by score, best first. Unscored results sort last.
pub struct SortResults;

#[async_trait]
impl Processor for SortResults {
    fn name(&self) -> &'static str {
        "SortResults"
    }

    async fn process(
        &self,
        mut collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        collection.results.sort_by(|a, b| {
            b.score
                .unwrap_or(f64::MIN)
                .total_cmp(&a.score.unwrap_or(f64::MIN))
        });
        collection
    }
}
