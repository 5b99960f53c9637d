//! Weighted composition of traversal retrievers.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use lexigraph_core::config::RetrievalConfig;
use lexigraph_core::error::{CoreError, CoreResult};
use lexigraph_core::metadata::FilterConfig;
use lexigraph_core::model::{SearchQuery, SearchResultCollection};
use lexigraph_core::store::{GraphStore, VectorStore};

use crate::error::RetrievalResult;
use crate::query::{QueryContextBuilder, QueryDecomposer};
use crate::utils::parallel_map;

use super::chunk_based::ChunkBasedSearch;
use super::entity_based::EntityBasedSearch;
use super::traversal::{TraversalLimits, TraversalRetriever};

/// Which traversal strategy a weighted slot runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalKind {
    EntityBased,
    ChunkBased,
}

/// One traversal strategy with the weight applied to its query limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedTraversal {
    pub kind: TraversalKind,
    pub weight: f64,
}

impl WeightedTraversal {
    pub fn new(kind: TraversalKind, weight: f64) -> Self {
        Self { kind, weight }
    }

    /// Stock configuration: a light chunk-based pass plus a full-weight
    /// entity-based pass.
    pub fn default_set() -> Vec<Self> {
        vec![
            Self::new(TraversalKind::ChunkBased, 0.2),
            Self::new(TraversalKind::EntityBased, 1.0),
        ]
    }
}

/// Scale a base limit by `min(1, weight * factor)`, rounding up.
///
/// A weight can only shrink the base limit, never amplify it: weights at
/// or above `1 / factor` leave the limit unchanged.
fn weighted_limit(base: usize, weight: f64, factor: f64) -> usize {
    let multiplier = (weight * factor).min(1.0);
    (base as f64 * multiplier).ceil() as usize
}

/// Runs several weighted traversal retrievers over a query, optionally
/// decomposed into subqueries first.
///
/// Entities are resolved once per subquery and shared by every
/// sub-retriever. The merged output is raw: results and entities are
/// unioned with no deduplication, which is left to the processing
/// pipeline.
pub struct CompositeRetriever {
    graph_store: Arc<dyn GraphStore>,
    vector_store: Arc<dyn VectorStore>,
    context_builder: QueryContextBuilder,
    decomposer: Option<QueryDecomposer>,
    retrievers: Vec<WeightedTraversal>,
    config: RetrievalConfig,
    filter_config: FilterConfig,
}

impl CompositeRetriever {
    pub fn new(
        graph_store: Arc<dyn GraphStore>,
        vector_store: Arc<dyn VectorStore>,
        context_builder: QueryContextBuilder,
        decomposer: Option<QueryDecomposer>,
        retrievers: Vec<WeightedTraversal>,
        config: RetrievalConfig,
        filter_config: FilterConfig,
    ) -> CoreResult<Self> {
        if retrievers.is_empty() {
            return Err(CoreError::Validation {
                field: "retrievers".to_string(),
                message: "at least one weighted retriever is required".to_string(),
            });
        }
        if let Some(invalid) = retrievers.iter().find(|r| r.weight <= 0.0) {
            return Err(CoreError::Validation {
                field: "retrievers".to_string(),
                message: format!("weight must be positive, got {}", invalid.weight),
            });
        }
        if config.derive_subqueries && decomposer.is_none() {
            return Err(CoreError::MissingCapability {
                component: "CompositeRetriever".to_string(),
                capability: "query decomposer (derive_subqueries is enabled)".to_string(),
            });
        }
        Ok(Self {
            graph_store,
            vector_store,
            context_builder: context_builder.with_entity_expansion(config.expand_entities),
            decomposer,
            retrievers,
            config,
            filter_config,
        })
    }

    fn build_retriever(&self, slot: &WeightedTraversal) -> Box<dyn TraversalRetriever> {
        let limits = TraversalLimits {
            intermediate: weighted_limit(self.config.intermediate_limit, slot.weight, 2.0),
            per_query: weighted_limit(self.config.query_limit, slot.weight, 1.0),
        };
        match slot.kind {
            TraversalKind::EntityBased => Box::new(EntityBasedSearch::new(
                Arc::clone(&self.graph_store),
                self.config.clone(),
                limits,
            )),
            TraversalKind::ChunkBased => Box::new(ChunkBasedSearch::new(
                Arc::clone(&self.graph_store),
                Arc::clone(&self.vector_store),
                self.config.clone(),
                limits,
                self.filter_config.clone(),
            )),
        }
    }

    /// Run the full composite search.
    ///
    /// Each subquery fans out through all weighted sub-retrievers in
    /// parallel; a failing sub-retriever is logged and excluded rather
    /// than aborting the call.
    pub async fn retrieve(&self, query: &SearchQuery) -> RetrievalResult<SearchResultCollection> {
        let start = Instant::now();

        let subqueries = match &self.decomposer {
            Some(decomposer) if self.config.derive_subqueries => decomposer.decompose(query).await,
            _ => vec![query.clone()],
        };
        debug!(count = subqueries.len(), "subqueries");

        let subquery_count = subqueries.len();
        let batches = parallel_map(subqueries, subquery_count, |subquery| async move {
            self.search_subquery(&subquery).await
        })
        .await;

        let mut merged = SearchResultCollection::default();
        for batch in batches {
            let batch = batch?;
            for result in batch.results {
                merged.add_search_result(result);
            }
            for entity in batch.entities {
                merged.add_entity(entity);
            }
            merged.entity_contexts.extend(batch.entity_contexts);
        }

        debug!(
            results = merged.results.len(),
            entities = merged.entities.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "composite retrieval complete"
        );
        Ok(merged)
    }

    async fn search_subquery(
        &self,
        query: &SearchQuery,
    ) -> RetrievalResult<SearchResultCollection> {
        let ctx = self.context_builder.build(query).await?;

        let jobs: Vec<(&'static str, Box<dyn TraversalRetriever>)> = self
            .retrievers
            .iter()
            .map(|slot| {
                let retriever = self.build_retriever(slot);
                (retriever.name(), retriever)
            })
            .collect();

        let batches = parallel_map(jobs, self.config.num_workers, |(name, retriever)| {
            let query = query.clone();
            let ctx = ctx.clone();
            async move { (name, retriever.retrieve(&query, &ctx).await) }
        })
        .await;

        let mut collection = SearchResultCollection::default();
        for (name, batch) in batches {
            match batch {
                Ok(batch) => collection.results.extend(batch.results),
                Err(e) => {
                    error!(retriever = name, error = %e, "sub-retriever failed, excluding its results");
                }
            }
        }
        collection.entities = ctx.entities;
        collection.entity_contexts = ctx.entity_contexts;
        Ok(collection)
    }
}
