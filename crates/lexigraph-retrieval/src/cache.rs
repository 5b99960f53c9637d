//! Shared caches for embedding and statement-adjacency lookups.
//!
//! The only resources shared across concurrently-running sub-retrievers
//! within one retrieval call. Read/append-only for the life of the call:
//! entries are never invalidated, so concurrent lookups of disjoint id
//! sets need no coordination beyond the population lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{error, warn};

use lexigraph_core::config::RetryConfig;
use lexigraph_core::error::CoreResult;
use lexigraph_core::store::graph::{run_query, GraphStore};
use lexigraph_core::store::{with_backoff, VectorStore};

use crate::utils::statements::EmbeddingMap;

const STATEMENT_INDEX: &str = "statement";

/// Caches statement embeddings fetched from the vector store.
pub struct SharedEmbeddingCache {
    cache: Mutex<EmbeddingMap>,
    vector_store: Arc<dyn VectorStore>,
    retry: RetryConfig,
}

impl SharedEmbeddingCache {
    pub fn new(vector_store: Arc<dyn VectorStore>, retry: RetryConfig) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            vector_store,
            retry,
        }
    }

    /// Embeddings for the given statement ids, fetching cache misses from
    /// the vector store in one batch.
    ///
    /// A fetch failure (after retries) degrades to whatever the cache
    /// already holds; missing ids are simply absent from the result.
    pub async fn get_embeddings(&self, statement_ids: &[String]) -> EmbeddingMap {
        let mut found: EmbeddingMap = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        {
            let cache = self.cache.lock();
            for id in statement_ids {
                match cache.get(id) {
                    Some(embedding) => {
                        found.insert(id.clone(), Arc::clone(embedding));
                    }
                    None => missing.push(id.clone()),
                }
            }
        }

        if missing.is_empty() {
            return found;
        }

        match self.fetch(&missing).await {
            Ok(fetched) => {
                let mut cache = self.cache.lock();
                for (id, embedding) in fetched {
                    cache.insert(id.clone(), Arc::clone(&embedding));
                    found.insert(id, embedding);
                }
            }
            Err(e) => {
                error!(error = %e, "failed to fetch embeddings after retries");
                warn!(
                    returned = found.len(),
                    requested = statement_ids.len(),
                    "returning cached embeddings only"
                );
            }
        }

        found
    }

    async fn fetch(&self, ids: &[String]) -> CoreResult<EmbeddingMap> {
        let index = self.vector_store.get_index(STATEMENT_INDEX)?;
        let records = with_backoff(&self.retry, || index.get_embeddings(ids)).await?;
        Ok(records
            .into_iter()
            .map(|r| (r.id, Arc::new(r.embedding)))
            .collect())
    }
}

/// Caches statement-graph adjacency fetched from the graph store.
///
/// A statement's neighbours are the statements supported by any entity
/// that also supports it.
pub struct SharedNeighbourCache {
    cache: Mutex<HashMap<String, Arc<Vec<String>>>>,
    graph_store: Arc<dyn GraphStore>,
    retry: RetryConfig,
}

impl SharedNeighbourCache {
    pub fn new(graph_store: Arc<dyn GraphStore>, retry: RetryConfig) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            graph_store,
            retry,
        }
    }

    /// Neighbouring statement ids for one statement, fetching cache
    /// misses from the graph store. A statement with no neighbours
    /// yields an empty list, not an error.
    pub async fn get_neighbours(&self, statement_id: &str) -> CoreResult<Arc<Vec<String>>> {
        if let Some(neighbours) = self.cache.lock().get(statement_id) {
            return Ok(Arc::clone(neighbours));
        }

        let statement_id_expr = self.graph_store.node_id("s.statementId");
        let neighbour_id = self.graph_store.node_id("neighbour.statementId");
        let query = format!(
            r#"
        // get statement neighbours
        MATCH (e:`__Entity__`)-[:`__SUBJECT__`|`__OBJECT__`]->(:`__Fact__`)-[:`__SUPPORTS__`]->(s:`__Statement__`)
        WHERE {statement_id_expr} = $statementId
        WITH s, collect(DISTINCT e) AS entities
        UNWIND entities AS entity
        MATCH (entity)-[:`__SUBJECT__`|`__OBJECT__`]->(:`__Fact__`)-[:`__SUPPORTS__`]->(neighbour:`__Statement__`)
        RETURN DISTINCT {neighbour_id} AS statementId"#
        );

        let rows = run_query(
            &*self.graph_store,
            &query,
            json!({ "statementId": statement_id }),
            &self.retry,
        )
        .await?;

        let neighbours: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get("statementId"))
            .filter_map(|v| v.as_str())
            .filter(|id| *id != statement_id)
            .map(str::to_string)
            .collect();

        let neighbours = Arc::new(neighbours);
        self.cache
            .lock()
            .insert(statement_id.to_string(), Arc::clone(&neighbours));
        Ok(neighbours)
    }
}
