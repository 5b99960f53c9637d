//! Result rescoring.

use async_trait::async_trait;

use lexigraph_core::model::{SearchQuery, SearchResultCollection};

use super::{retain_results, Processor};

/// Sets each result's score to the mean of its topics' best statement
/// scores, so a result is as good as its topics' strongest evidence.
pub struct RescoreResults;

#[async_trait]
impl Processor for RescoreResults {
    fn name(&self) -> &'static str {
        "RescoreResults"
    }

    async fn process(
        &self,
        collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        retain_results(collection, |_, mut result| {
            let topic_scores: Vec<f64> = result
                .topics
                .iter()
                .filter(|t| !t.statements.is_empty())
                .map(|t| {
                    t.statements
                        .iter()
                        .map(|s| s.score)
                        .fold(f64::MIN, f64::max)
                })
                .collect();
            if !topic_scores.is_empty() {
                result.score =
                    Some(topic_scores.iter().sum::<f64>() / topic_scores.len() as f64);
            }
            Some(result)
        })
    }
}

/// Resets every score to zero, for callers that want rank-only evidence.
pub struct ZeroScores;

#[async_trait]
impl Processor for ZeroScores {
    fn name(&self) -> &'static str {
        "ZeroScores"
    }

    async fn process(
        &self,
        mut collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        for result in &mut collection.results {
            result.score = Some(0.0);
            for topic in &mut result.topics {
                for statement in &mut topic.statements {
                    statement.score = 0.0;
                }
            }
        }
        collection
    }
}
