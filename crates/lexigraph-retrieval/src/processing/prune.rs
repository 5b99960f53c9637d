//! Score-based pruning.

use async_trait::async_trait;

use lexigraph_core::model::{SearchQuery, SearchResultCollection};

use super::{retain_results, retain_topics, Processor};

/// Drops statements scoring below a fraction of the best statement in
/// the collection. A zero factor disables pruning.
pub struct PruneStatements {
    pruning_factor: f64,
}

impl PruneStatements {
    pub fn new(pruning_factor: f64) -> Self {
        Self { pruning_factor }
    }
}

#[async_trait]
impl Processor for PruneStatements {
    fn name(&self) -> &'static str {
        "PruneStatements"
    }

    async fn process(
        &self,
        collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        if self.pruning_factor <= 0.0 {
            return collection;
        }

        let max_score = collection
            .results
            .iter()
            .flat_map(|r| r.topics.iter())
            .flat_map(|t| t.statements.iter())
            .map(|s| s.score)
            .fold(f64::MIN, f64::max);
        if max_score == f64::MIN {
            return collection;
        }
        let threshold = max_score * self.pruning_factor;

        retain_results(collection, |_, result| {
            Some(retain_topics(result, |mut topic| {
                topic.statements.retain(|s| s.score >= threshold);
                Some(topic)
            }))
        })
    }
}

/// Drops whole results scoring below a fixed threshold.
pub struct PruneResults {
    threshold: f64,
}

impl PruneResults {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl Processor for PruneResults {
    fn name(&self) -> &'static str {
        "PruneResults"
    }

    async fn process(
        &self,
        collection: SearchResultCollection,
        _query: &SearchQuery,
    ) -> SearchResultCollection {
        retain_results(collection, |_, result| {
            (result.score.unwrap_or(0.0) >= self.threshold).then_some(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn weak_statements_are_pruned_against_the_global_best() {
        let input = collection(vec![result(
            "src1",
            vec![topic(
                "T",
                vec![
                    statement("s1", "strong", 10.0),
                    statement("s2", "weak", 0.5),
                    statement("s3", "borderline", 1.0),
                ],
            )],
            None,
        )]);

        let output = PruneStatements::new(0.1)
            .process(input, &SearchQuery::new("q"))
            .await;
        let values: Vec<&str> = output.results[0].topics[0]
            .statements
            .iter()
            .map(|s| s.value.as_str())
            .collect();
        assert_eq!(values, vec!["strong", "borderline"]);
    }

    #[tokio::test]
    async fn zero_factor_disables_pruning() {
        let input = collection(vec![result(
            "src1",
            vec![topic("T", vec![statement("s1", "weak", 0.0001)])],
            None,
        )]);
        let output = PruneStatements::new(0.0)
            .process(input.clone(), &SearchQuery::new("q"))
            .await;
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn fully_pruned_topics_and_results_disappear() {
        let input = collection(vec![
            result("src1", vec![topic("T", vec![statement("s1", "strong", 10.0)])], None),
            result("src2", vec![topic("T", vec![statement("s2", "weak", 0.1)])], None),
        ]);
        let output = PruneStatements::new(0.5)
            .process(input, &SearchQuery::new("q"))
            .await;
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].source.key(), "src1");
    }

    #[tokio::test]
    async fn low_scoring_results_are_pruned() {
        let input = collection(vec![
            result("src1", vec![topic("T", vec![statement("s1", "a", 1.0)])], Some(0.5)),
            result("src2", vec![topic("T", vec![statement("s2", "b", 1.0)])], Some(0.01)),
        ]);
        let output = PruneResults::new(0.08)
            .process(input, &SearchQuery::new("q"))
            .await;
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].source.key(), "src1");
    }
}
