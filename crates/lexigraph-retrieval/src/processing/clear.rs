//! Internal-field stripping before formatting.

use async_trait::async_trait;

use lexigraph_core::model::{SearchQuery, SearchResultCollection};

use super::Processor;

/// Removes chunk references from every topic.
pub struct ClearChunks;

#[async_trait]
impl Processor for ClearChunks {
    fn name(&self) -> &'static str {
        "ClearChunks"
    }

    async fn process(
        &self,
        mut collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        for result in &mut collection.results {
            for topic in &mut result.topics {
                topic.chunks.clear();
            }
        }
        collection
    }
}

/// Removes result-level scores.
pub struct ClearScores;

#[async_trait]
impl Processor for ClearScores {
    fn name(&self) -> &'static str {
        "ClearScores"
    }

    async fn process(
        &self,
        mut collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        for result in &mut collection.results {
            result.score = None;
        }
        collection
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn chunks_and_scores_are_stripped() {
        let input = collection(vec![result(
            "src1",
            vec![topic("T", vec![statement("s1", "a", 1.0)])],
            Some(1.0),
        )]);

        let output = ClearChunks.process(input, &SearchQuery::new("q")).await;
        assert!(output.results[0].topics[0].chunks.is_empty());

        let output = ClearScores.process(output, &SearchQuery::new("q")).await;
        assert!(output.results[0].score.is_none());
        // Statement scores survive; only result scores are display noise.
        assert_eq!(output.results[0].topics[0].statements[0].score, 1.0);
    }
}
