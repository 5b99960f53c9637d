//! Count caps.

use async_trait::async_trait;

use lexigraph_core::model::{SearchQuery, SearchResultCollection};

use super::Processor;

/// Keeps only the first `max_search_results` results.
pub struct TruncateResults {
    max_search_results: usize,
}

impl TruncateResults {
    pub fn new(max_search_results: usize) -> Self {
        Self { max_search_results }
    }
}

#[async_trait]
impl Processor for TruncateResults {
    fn name(&self) -> &'static str {
        "TruncateResults"
    }

    async fn process(
        &self,
        mut collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        collection.results.truncate(self.max_search_results);
        collection
    }
}

/// Keeps only the first `max_statements_per_topic` statements per topic.
pub struct TruncateStatements {
    max_statements_per_topic: usize,
}

impl TruncateStatements {
    pub fn new(max_statements_per_topic: usize) -> Self {
        Self {
            max_statements_per_topic,
        }
    }
}

#[async_trait]
impl Processor for TruncateStatements {
    fn name(&self) -> &'static str {
        "TruncateStatements"
    }

    async fn process(
        &self,
        mut collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        for result in &mut collection.results {
            for topic in &mut result.topics {
                topic.statements.truncate(self.max_statements_per_topic);
            }
        }
        collection
    }
}
