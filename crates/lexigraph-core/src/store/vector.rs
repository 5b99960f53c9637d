//! Vector store abstraction.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreResult;
use crate::metadata::FilterConfig;
use crate::model::SearchQuery;

/// One id/embedding pair returned by [`VectorIndex::get_embeddings`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub embedding: Vec<f32>,
}

/// A named similarity index over one node kind (statements, chunks, …).
///
/// `top_k` rows are JSON objects shaped like the graph rows for the same
/// node kind, e.g. `{"statement": {"statementId": …}, "score": …}` for the
/// statement index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Most similar elements for the query, best first.
    async fn top_k(
        &self,
        query: &SearchQuery,
        top_k: usize,
        filter: Option<&FilterConfig>,
    ) -> CoreResult<Vec<Value>>;

    /// Stored embeddings for the given element ids. Unknown ids are
    /// silently absent from the result.
    async fn get_embeddings(&self, ids: &[String]) -> CoreResult<Vec<EmbeddingRecord>>;
}

/// A collection of named vector indexes.
pub trait VectorStore: Send + Sync {
    /// Look up an index by name, failing if the store does not provide it.
    fn get_index(&self, name: &str) -> CoreResult<Arc<dyn VectorIndex>>;
}
