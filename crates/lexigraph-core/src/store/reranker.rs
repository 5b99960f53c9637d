//! Pairwise reranker abstraction.

use async_trait::async_trait;

use crate::error::CoreResult;

/// A scoring model that orders candidates by relevance to a query,
/// independent of the original retrieval score.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score each `(query, candidate)` pair. The returned vector has one
    /// score per input pair, in input order.
    async fn rerank_pairs(
        &self,
        pairs: &[(String, String)],
        batch_size: usize,
    ) -> CoreResult<Vec<f32>>;

    /// Preferred scoring batch size for this backend.
    fn batch_size(&self) -> usize {
        32
    }
}
