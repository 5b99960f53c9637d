//! Token-overlap reranker.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::{CoreError, CoreResult};
use crate::store::Reranker;

/// Scores candidates by word overlap with the query.
///
/// Deterministic and model-free; the score is the fraction of query words
/// present in the candidate.
#[derive(Default)]
pub struct StubReranker {
    failing: bool,
}

impl StubReranker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reranker whose every call fails, for degradation tests.
    pub fn failing() -> Self {
        Self { failing: true }
    }
}

fn words(s: &str) -> HashSet<String> {
    s.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

#[async_trait]
impl Reranker for StubReranker {
    async fn rerank_pairs(
        &self,
        pairs: &[(String, String)],
        _batch_size: usize,
    ) -> CoreResult<Vec<f32>> {
        if self.failing {
            return Err(CoreError::Reranker("stub reranker offline".to_string()));
        }
        Ok(pairs
            .iter()
            .map(|(query, candidate)| {
                let q = words(query);
                if q.is_empty() {
                    return 0.0;
                }
                let c = words(candidate);
                q.intersection(&c).count() as f32 / q.len() as f32
            })
            .collect())
    }
}
