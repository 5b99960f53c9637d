//! Statement display-string materialization.

use async_trait::async_trait;

use lexigraph_core::model::{SearchQuery, SearchResultCollection};

use super::Processor;

/// Fills in each statement's `statement_str`: the statement text,
/// followed by its fact phrases and detail lines when present. Later
/// stages (reranking, display formatting) key off this string.
pub struct PopulateStatementStrs;

#[async_trait]
impl Processor for PopulateStatementStrs {
    fn name(&self) -> &'static str {
        "PopulateStatementStrs"
    }

    async fn process(
        &self,
        mut collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        for result in &mut collection.results {
            for topic in &mut result.topics {
                for statement in &mut topic.statements {
                    let mut details: Vec<String> =
                        statement.facts.iter().map(|f| f.display_value()).collect();
                    details.extend(statement.details.iter().cloned());
                    statement.statement_str = Some(if details.is_empty() {
                        statement.value.clone()
                    } else {
                        format!("{} (details: {})", statement.value, details.join(", "))
                    });
                }
            }
        }
        collection
    }
}
