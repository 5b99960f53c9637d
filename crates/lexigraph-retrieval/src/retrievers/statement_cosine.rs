//! Statement search by exact cosine similarity.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use lexigraph_core::metadata::FilterConfig;
use lexigraph_core::model::SearchQuery;
use lexigraph_core::store::VectorStore;

use crate::cache::SharedEmbeddingCache;
use crate::error::{RetrievalError, RetrievalResult};
use crate::utils::statements::get_top_k;

use super::hit::{SearchType, StatementHit};
use super::SemanticRetriever;

const STATEMENT_INDEX: &str = "statement";

/// Candidate pool fetched from the vector index before the exact cosine
/// rerank against cached embeddings.
const CANDIDATE_POOL_SIZE: usize = 500;

const DEFAULT_TOP_K: usize = 100;

/// Ranks statements by cosine similarity of their cached embeddings to
/// the query embedding.
///
/// The vector index supplies a generous candidate pool; the exact cosine
/// scores computed here decide the final order and cut-off.
pub struct StatementCosineSearch {
    vector_store: Arc<dyn VectorStore>,
    embedding_cache: Arc<SharedEmbeddingCache>,
    top_k: usize,
    filter_config: FilterConfig,
}

impl StatementCosineSearch {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedding_cache: Arc<SharedEmbeddingCache>,
        filter_config: FilterConfig,
    ) -> Self {
        Self {
            vector_store,
            embedding_cache,
            top_k: DEFAULT_TOP_K,
            filter_config,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[async_trait]
impl SemanticRetriever for StatementCosineSearch {
    fn name(&self) -> &'static str {
        "StatementCosineSearch"
    }

    async fn retrieve_hits(&self, query: &SearchQuery) -> RetrievalResult<Vec<StatementHit>> {
        let query_embedding =
            query
                .embedding
                .as_deref()
                .ok_or(RetrievalError::MissingQueryEmbedding {
                    operation: "statement cosine search",
                })?;

        let index = self.vector_store.get_index(STATEMENT_INDEX)?;
        let rows = index
            .top_k(query, CANDIDATE_POOL_SIZE, Some(&self.filter_config))
            .await?;

        let statement_ids: Vec<String> = rows
            .iter()
            .filter_map(|row| row.pointer("/statement/statementId"))
            .filter_map(|id| id.as_str())
            .map(str::to_string)
            .collect();
        debug!(candidates = statement_ids.len(), "cosine search candidates");

        let embeddings = self.embedding_cache.get_embeddings(&statement_ids).await;
        let top_k = get_top_k(query_embedding, &embeddings, self.top_k);
        debug!(count = top_k.len(), "cosine search hits");

        Ok(top_k
            .into_iter()
            .map(|(score, statement_id)| {
                StatementHit::new(statement_id, score as f64, SearchType::CosineSimilarity)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexigraph_core::config::RetryConfig;
    use lexigraph_core::stubs::{InMemoryVectorStore, VectorRecord};
    use serde_json::json;

    fn statement_record(id: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding,
            row: json!({ "statement": { "statementId": id } }),
        }
    }

    fn search_with(records: Vec<VectorRecord>) -> StatementCosineSearch {
        let store = Arc::new(InMemoryVectorStore::with_indexes(&["statement"]));
        for record in records {
            store.add_record("statement", record).unwrap();
        }
        let cache = Arc::new(SharedEmbeddingCache::new(
            Arc::clone(&store) as _,
            RetryConfig::default(),
        ));
        StatementCosineSearch::new(store, cache, FilterConfig::default())
    }

    #[tokio::test]
    async fn hits_are_ordered_by_cosine_similarity() {
        let search = search_with(vec![
            statement_record("s1", vec![1.0, 0.0]),
            statement_record("s2", vec![0.0, 1.0]),
            statement_record("s3", vec![0.9, 0.1]),
        ]);
        let query = SearchQuery::new("q").with_embedding(vec![1.0, 0.0]);
        let hits = search.retrieve_hits(&query).await.unwrap();

        let ids: Vec<&str> = hits.iter().map(|h| h.statement_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s3", "s2"]);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].search_type, SearchType::CosineSimilarity);
    }

    #[tokio::test]
    async fn top_k_caps_the_hit_count() {
        let search = search_with(vec![
            statement_record("s1", vec![1.0, 0.0]),
            statement_record("s2", vec![0.9, 0.1]),
            statement_record("s3", vec![0.8, 0.2]),
        ])
        .with_top_k(2);
        let query = SearchQuery::new("q").with_embedding(vec![1.0, 0.0]);
        let hits = search.retrieve_hits(&query).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn missing_query_embedding_is_an_error() {
        let search = search_with(vec![statement_record("s1", vec![1.0])]);
        let err = search
            .retrieve_hits(&SearchQuery::new("q"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::MissingQueryEmbedding { .. }
        ));
    }
}
