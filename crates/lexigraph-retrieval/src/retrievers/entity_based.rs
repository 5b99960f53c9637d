//! Entity-based graph search.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use lexigraph_core::config::RetrievalConfig;
use lexigraph_core::error::CoreResult;
use lexigraph_core::model::{SearchQuery, SearchResultCollection};
use lexigraph_core::store::graph::{run_query, GraphStore};

use crate::error::RetrievalResult;
use crate::query::QueryContext;
use crate::utils::parallel_map;

use super::traversal::{collect_search_results, search_result_query, TraversalLimits, TraversalRetriever};

/// Searches the graph outward from resolved entities.
///
/// Issues a single-entity query per start node (statements reachable from
/// that entity) and a multi-entity query per disjoint (start, rest) pair
/// (statements on 1–2 hop relation paths between them), all in one
/// parallel batch.
pub struct EntityBasedSearch {
    graph_store: Arc<dyn GraphStore>,
    config: RetrievalConfig,
    limits: TraversalLimits,
}

impl EntityBasedSearch {
    pub fn new(
        graph_store: Arc<dyn GraphStore>,
        config: RetrievalConfig,
        limits: TraversalLimits,
    ) -> Self {
        Self {
            graph_store,
            config,
            limits,
        }
    }

    /// Pair each value with every other value in the list.
    fn disjoint_pairs(values: &[String]) -> Vec<(String, Vec<String>)> {
        let unique: HashSet<&str> = values.iter().map(String::as_str).collect();
        values
            .iter()
            .map(|value| {
                let others: Vec<String> = unique
                    .iter()
                    .filter(|other| **other != value.as_str())
                    .map(|other| other.to_string())
                    .collect();
                (value.clone(), others)
            })
            .collect()
    }

    fn multi_entity_query(&self) -> String {
        let entity_id = self.graph_store.node_id("entityId");
        let end_id = self.graph_store.node_id("e2.entityId");
        search_result_query(
            &*self.graph_store,
            &format!(
                r#"
    // multiple entity-based graph search
    MATCH p=(e1:`__Entity__`{{{entity_id}:$startId}})-[:`__RELATION__`*1..2]-(e2:`__Entity__`)
    WHERE {end_id} IN $endIds
    UNWIND nodes(p) AS n
    WITH DISTINCT COLLECT(n) AS entities
    MATCH (se:`__Entity__`)-[:`__SUBJECT__`]->(f:`__Fact__`)<-[:`__OBJECT__`]-(oe:`__Entity__`),
        (f)-[:`__SUPPORTS__`]->(:`__Statement__`)
        -[:`__PREVIOUS__`*0..1]-(l:`__Statement__`)
        -[:`__BELONGS_TO__`]->(t:`__Topic__`)
    WHERE se IN entities AND oe IN entities"#
            ),
        )
    }

    fn single_entity_query(&self) -> String {
        let entity_id = self.graph_store.node_id("entityId");
        search_result_query(
            &*self.graph_store,
            &format!(
                r#"
    // single entity-based graph search
    MATCH (:`__Entity__`{{{entity_id}:$startId}})
        -[:`__SUBJECT__`]->(f:`__Fact__`)
        -[:`__SUPPORTS__`]->(:`__Statement__`)
        -[:`__PREVIOUS__`*0..1]-(l:`__Statement__`)
        -[:`__BELONGS_TO__`]->(t:`__Topic__`)"#
            ),
        )
    }
}

#[async_trait]
impl TraversalRetriever for EntityBasedSearch {
    fn name(&self) -> &'static str {
        "EntityBasedSearch"
    }

    async fn start_node_ids(
        &self,
        _query: &SearchQuery,
        ctx: &QueryContext,
    ) -> RetrievalResult<Vec<String>> {
        if ctx.entity_contexts.is_empty() {
            warn!("no entity ids available for entity-based search");
        }
        Ok(ctx.start_entity_ids())
    }

    async fn graph_search(
        &self,
        _query: &SearchQuery,
        _ctx: &QueryContext,
        start_node_ids: &[String],
    ) -> RetrievalResult<SearchResultCollection> {
        debug!(start_nodes = start_node_ids.len(), "running entity-based search");

        let mut jobs: Vec<(String, Value)> = Vec::new();
        for (start_id, end_ids) in Self::disjoint_pairs(start_node_ids) {
            if end_ids.is_empty() {
                continue;
            }
            jobs.push((
                self.multi_entity_query(),
                json!({
                    "startId": start_id,
                    "endIds": end_ids,
                    "statementLimit": self.limits.intermediate,
                    "limit": self.limits.per_query,
                }),
            ));
        }
        for entity_id in start_node_ids {
            jobs.push((
                self.single_entity_query(),
                json!({
                    "startId": entity_id,
                    "statementLimit": self.limits.intermediate,
                    "limit": self.limits.per_query,
                }),
            ));
        }

        let batches: Vec<CoreResult<Vec<Value>>> =
            parallel_map(jobs, self.config.num_workers, |(query, parameters)| {
                let graph_store = Arc::clone(&self.graph_store);
                let retry = self.config.retry.clone();
                async move { run_query(&*graph_store, &query, parameters, &retry).await }
            })
            .await;

        let mut rows = Vec::new();
        for batch in batches {
            rows.extend(batch?);
        }

        Ok(collect_search_results(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexigraph_core::model::{Entity, ScoredEntity};
    use lexigraph_core::stubs::StubGraphStore;

    fn context_for(ids: &[&str]) -> QueryContext {
        QueryContext {
            entities: Vec::new(),
            entity_contexts: ids
                .iter()
                .map(|id| {
                    vec![ScoredEntity::new(
                        Entity {
                            entity_id: id.to_string(),
                            value: id.to_string(),
                            classification: None,
                        },
                        1.0,
                    )]
                })
                .collect(),
        }
    }

    fn result_row(source: &str, topic: &str, statement: &str) -> Value {
        json!({
            "result": {
                "score": 1.0,
                "source": { "sourceId": source, "metadata": {} },
                "topics": [{
                    "value": topic,
                    "statements": [{ "statementId": "s1", "value": statement, "score": 1 }]
                }]
            }
        })
    }

    #[test]
    fn disjoint_pairs_cover_all_values() {
        let values = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let pairs = EntityBasedSearch::disjoint_pairs(&values);
        assert_eq!(pairs.len(), 3);
        let (start, others) = &pairs[0];
        assert_eq!(start, "a");
        assert_eq!(others.len(), 2);
        assert!(!others.contains(start));
    }

    #[tokio::test]
    async fn start_nodes_come_from_entity_contexts() {
        let store = Arc::new(StubGraphStore::new());
        let search = EntityBasedSearch::new(
            Arc::clone(&store) as _,
            RetrievalConfig::default(),
            TraversalLimits::from_config(&RetrievalConfig::default()),
        );
        let ctx = context_for(&["e1", "e2"]);
        let ids = search.start_node_ids(&SearchQuery::new("q"), &ctx).await.unwrap();
        assert_eq!(ids, vec!["e1", "e2"]);
    }

    #[tokio::test]
    async fn search_issues_single_and_multi_entity_queries() {
        let store = Arc::new(
            StubGraphStore::new()
                .with_rows(
                    "single entity-based graph search",
                    vec![result_row("src1", "Invoicing", "Alice reviewed invoice 42")],
                )
                .with_rows(
                    "multiple entity-based graph search",
                    vec![result_row("src2", "Approvals", "Bob approved invoice 42")],
                ),
        );
        let search = EntityBasedSearch::new(
            Arc::clone(&store) as _,
            RetrievalConfig::default(),
            TraversalLimits::from_config(&RetrievalConfig::default()),
        );
        let ctx = context_for(&["e1", "e2"]);
        let results = search.retrieve(&SearchQuery::new("q"), &ctx).await.unwrap();

        // Two multi-entity jobs + two single-entity jobs, one row each.
        assert_eq!(store.query_count(), 4);
        assert_eq!(results.results.len(), 4);
        assert_eq!(results.entity_contexts.len(), 2);
    }

    #[tokio::test]
    async fn single_start_node_skips_multi_entity_queries() {
        let store = Arc::new(StubGraphStore::new());
        let search = EntityBasedSearch::new(
            Arc::clone(&store) as _,
            RetrievalConfig::default(),
            TraversalLimits::from_config(&RetrievalConfig::default()),
        );
        let ctx = context_for(&["e1"]);
        search.retrieve(&SearchQuery::new("q"), &ctx).await.unwrap();
        assert_eq!(store.query_count(), 1);
        assert!(store.queries()[0].contains("single entity-based graph search"));
    }
}
