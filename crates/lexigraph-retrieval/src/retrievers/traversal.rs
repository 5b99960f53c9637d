//! Traversal-based retrieval: the shared contract and query plumbing for
//! retrievers that walk the graph from a set of start nodes.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use lexigraph_core::config::RetrievalConfig;
use lexigraph_core::model::{SearchQuery, SearchResult, SearchResultCollection};
use lexigraph_core::store::GraphStore;

use crate::error::RetrievalResult;
use crate::query::QueryContext;

/// Per-retriever query limits, derived from the base configuration and
/// optionally scaled down by a composite weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits {
    /// Intermediate statement limit inside a query.
    pub intermediate: usize,
    /// Result limit per query.
    pub per_query: usize,
}

impl TraversalLimits {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            intermediate: config.intermediate_limit,
            per_query: config.query_limit,
        }
    }
}

/// A retriever that expands a set of graph start nodes into search
/// results. Concrete variants differ only in how start nodes are chosen
/// and which query shapes they issue.
#[async_trait]
pub trait TraversalRetriever: Send + Sync {
    fn name(&self) -> &'static str;

    /// Select the nodes traversal begins from. May be empty for
    /// retrievers that search independently of entities.
    async fn start_node_ids(
        &self,
        query: &SearchQuery,
        ctx: &QueryContext,
    ) -> RetrievalResult<Vec<String>>;

    /// Execute the graph search from the given start nodes.
    async fn graph_search(
        &self,
        query: &SearchQuery,
        ctx: &QueryContext,
        start_node_ids: &[String],
    ) -> RetrievalResult<SearchResultCollection>;

    /// Full search: start-node selection, graph search, and context
    /// attachment.
    async fn retrieve(
        &self,
        query: &SearchQuery,
        ctx: &QueryContext,
    ) -> RetrievalResult<SearchResultCollection> {
        let start_node_ids = self.start_node_ids(query, ctx).await?;
        let mut results = self.graph_search(query, ctx, &start_node_ids).await?;
        if results.entity_contexts.is_empty() {
            results.entity_contexts = ctx.entity_contexts.clone();
        }
        Ok(results)
    }
}

/// Compose a full search-result query from a retriever-specific match
/// clause.
///
/// The shared return clause walks statement → chunk → source, gathers
/// supporting facts with their subject and object entities, aggregates
/// statements under their topics, and scores each source by statement
/// density per chunk.
pub fn search_result_query(graph_store: &dyn GraphStore, match_clause: &str) -> String {
    let source_id = graph_store.node_id("s.sourceId");
    let chunk_id = graph_store.node_id("c.chunkId");
    let statement_id = graph_store.node_id("l.statementId");
    let topic_id = graph_store.node_id("t.topicId");
    let fact_id = graph_store.node_id("f.factId");
    let subject_id = graph_store.node_id("sub.entityId");
    let object_id = graph_store.node_id("obj.entityId");

    let return_clause = format!(
        r#"
    WITH DISTINCT l, t LIMIT $statementLimit
    MATCH (l:`__Statement__`)-[:`__MENTIONED_IN__`]->(c:`__Chunk__`)-[:`__EXTRACTED_FROM__`]->(s:`__Source__`)
    OPTIONAL MATCH (sub:`__Entity__`)-[:`__SUBJECT__`]->(f:`__Fact__`)-[:`__SUPPORTS__`]->(l)
    OPTIONAL MATCH (obj:`__Entity__`)-[:`__OBJECT__`]->(f)
    WITH {{ sourceId: {source_id}, metadata: s{{.*}} }} AS source,
        t, l, c,
        {{ chunkId: {chunk_id}, value: NULL }} AS cc,
        {{ statementId: {statement_id}, topicId: {topic_id}, value: l.value, details: l.details, chunkId: {chunk_id}, score: count(l),
           facts: collect(distinct CASE WHEN f IS NULL THEN NULL ELSE {{
               factId: {fact_id},
               subject: {{ entityId: {subject_id}, value: sub.value, class: sub.class }},
               predicate: f.predicate,
               object: CASE WHEN obj IS NULL THEN NULL ELSE {{ entityId: {object_id}, value: obj.value, class: obj.class }} END,
               complement: f.complement
           }} END) }} AS ll
    WITH source,
        t,
        collect(distinct cc) AS chunks,
        collect(distinct ll) AS statements
    WITH source,
        {{
            topicId: {topic_id},
            value: t.value,
            chunks: chunks,
            statements: statements
        }} AS topic
    RETURN {{
        score: sum(size(topic.statements)/size(topic.chunks)),
        source: source,
        topics: collect(distinct topic)
    }} AS result ORDER BY result.score DESC LIMIT $limit"#
    );

    format!("{match_clause}{return_clause}")
}

/// Recursively drop null entries so absent graph properties deserialize
/// into defaulted model fields.
fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                strip_nulls(v);
            }
        }
        Value::Array(items) => {
            items.retain(|v| !v.is_null());
            for v in items.iter_mut() {
                strip_nulls(v);
            }
        }
        _ => {}
    }
}

/// Normalize raw query rows into a result collection.
///
/// Rows lacking a source reference are discarded; rows that fail model
/// validation are logged and dropped so a malformed row can never surface
/// as partial evidence.
pub fn collect_search_results(rows: Vec<Value>) -> SearchResultCollection {
    let mut collection = SearchResultCollection::default();
    for mut row in rows {
        let result = row
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null);
        if result.pointer("/source/sourceId").is_none() {
            continue;
        }
        let mut result = result;
        strip_nulls(&mut result);
        match serde_json::from_value::<SearchResult>(result) {
            Ok(search_result) => collection.add_search_result(search_result),
            Err(e) => warn!(error = %e, "discarding malformed search result row"),
        }
    }
    collection
}
