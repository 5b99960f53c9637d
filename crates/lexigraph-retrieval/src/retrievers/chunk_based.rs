//! Chunk-based graph search.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use lexigraph_core::config::RetrievalConfig;
use lexigraph_core::error::CoreResult;
use lexigraph_core::metadata::FilterConfig;
use lexigraph_core::model::{SearchQuery, SearchResultCollection};
use lexigraph_core::store::graph::{run_query, GraphStore};
use lexigraph_core::store::VectorStore;

use crate::error::RetrievalResult;
use crate::query::QueryContext;
use crate::utils::parallel_map;
use crate::utils::vector::get_diverse_vss_elements;

use super::traversal::{collect_search_results, search_result_query, TraversalLimits, TraversalRetriever};

/// Searches the graph starting from vector-similar chunks.
///
/// Start nodes come from a diversity-spread top-k over the chunk index,
/// so the traversal fans out from several sources rather than the single
/// best-matching document.
pub struct ChunkBasedSearch {
    graph_store: Arc<dyn GraphStore>,
    vector_store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
    limits: TraversalLimits,
    filter_config: FilterConfig,
}

impl ChunkBasedSearch {
    pub fn new(
        graph_store: Arc<dyn GraphStore>,
        vector_store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
        limits: TraversalLimits,
        filter_config: FilterConfig,
    ) -> Self {
        Self {
            graph_store,
            vector_store,
            config,
            limits,
            filter_config,
        }
    }

    fn chunk_query(&self) -> String {
        let chunk_id = self.graph_store.node_id("c.chunkId");
        search_result_query(
            &*self.graph_store,
            &format!(
                r#"
    // chunk-based graph search
    MATCH (l:`__Statement__`)-[:`__PREVIOUS__`*0..1]-(:`__Statement__`)-[:`__BELONGS_TO__`]->(t:`__Topic__`)-[:`__MENTIONED_IN__`]->(c:`__Chunk__`)
    WHERE {chunk_id} = $chunkId"#
            ),
        )
    }
}

#[async_trait]
impl TraversalRetriever for ChunkBasedSearch {
    fn name(&self) -> &'static str {
        "ChunkBasedSearch"
    }

    async fn start_node_ids(
        &self,
        query: &SearchQuery,
        _ctx: &QueryContext,
    ) -> RetrievalResult<Vec<String>> {
        debug!("getting start node ids for chunk-based search");

        let chunks = get_diverse_vss_elements(
            "chunk",
            query,
            &*self.vector_store,
            &self.config,
            Some(&self.filter_config),
        )
        .await?;

        Ok(chunks
            .iter()
            .filter_map(|chunk| chunk.pointer("/chunk/chunkId"))
            .filter_map(|id| id.as_str())
            .map(|id| id.to_string())
            .collect())
    }

    async fn graph_search(
        &self,
        _query: &SearchQuery,
        _ctx: &QueryContext,
        start_node_ids: &[String],
    ) -> RetrievalResult<SearchResultCollection> {
        debug!(chunks = start_node_ids.len(), "running chunk-based search");

        let query_text = self.chunk_query();
        let batches: Vec<CoreResult<Vec<Value>>> = parallel_map(
            start_node_ids.to_vec(),
            self.config.num_workers,
            |chunk_id| {
                let graph_store = Arc::clone(&self.graph_store);
                let retry = self.config.retry.clone();
                let query_text = query_text.clone();
                async move {
                    let parameters = json!({
                        "chunkId": chunk_id,
                        "statementLimit": self.limits.intermediate,
                        "limit": self.limits.per_query,
                    });
                    run_query(&*graph_store, &query_text, parameters, &retry).await
                }
            },
        )
        .await;

        let mut rows = Vec::new();
        for batch in batches {
            rows.extend(batch?);
        }

        Ok(collect_search_results(rows))
    }
}
