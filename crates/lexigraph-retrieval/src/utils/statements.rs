//! Statement-level helpers: cosine ranking and batched materialization.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use lexigraph_core::config::RetryConfig;
use lexigraph_core::error::CoreResult;
use lexigraph_core::model::{Chunk, Source, Statement, Topic};
use lexigraph_core::store::graph::{node_result, run_query, GraphStore};

/// Embeddings keyed by statement id, shared across retrievers.
pub type EmbeddingMap = HashMap<String, Arc<Vec<f32>>>;

/// Cosine similarity of two vectors; zero when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Top-k statement ids by cosine similarity to the query embedding,
/// best first. Ties break on id for determinism.
pub fn get_top_k(
    query_embedding: &[f32],
    embeddings: &EmbeddingMap,
    top_k: usize,
) -> Vec<(f32, String)> {
    let mut scored: Vec<(f32, String)> = embeddings
        .iter()
        .map(|(id, embedding)| (cosine_similarity(query_embedding, embedding), id.clone()))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored.truncate(top_k);
    scored
}

/// A fully materialized statement with its topic, chunk and source.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementRow {
    pub statement: Statement,
    #[serde(default)]
    pub topic: Option<Topic>,
    #[serde(default)]
    pub chunk: Option<Chunk>,
    pub source: Source,
}

/// Fetch full statement/topic/chunk/source data for a batch of statement
/// ids in one query, avoiding a round-trip per statement.
///
/// Results come back in input-id order. Ids the graph no longer knows are
/// logged and dropped, never fatal.
pub async fn get_statements(
    graph_store: &dyn GraphStore,
    retry: &RetryConfig,
    statement_ids: &[String],
) -> CoreResult<Vec<StatementRow>> {
    if statement_ids.is_empty() {
        return Ok(Vec::new());
    }

    let statement_id = graph_store.node_id("statement.statementId");
    let query = format!(
        r#"
    // materialize statements
    MATCH (statement:`__Statement__`)-[:`__MENTIONED_IN__`]->(chunk:`__Chunk__`)-[:`__EXTRACTED_FROM__`]->(source:`__Source__`)
    WHERE {statement_id} IN $statementIds
    OPTIONAL MATCH (statement)-[:`__BELONGS_TO__`]->(topic:`__Topic__`)
    RETURN {{
        {statement_selector},
        {topic_selector},
        {chunk_selector},
        source: {{ sourceId: {source_id}, metadata: source{{.*}} }}
    }} AS result"#,
        statement_id = statement_id,
        statement_selector = node_result("statement", Some(&statement_id), &["*"]),
        topic_selector = node_result("topic", Some(&graph_store.node_id("topic.topicId")), &["value"]),
        chunk_selector = node_result("chunk", Some(&graph_store.node_id("chunk.chunkId")), &["*"]),
        source_id = graph_store.node_id("source.sourceId"),
    );

    let rows = run_query(
        graph_store,
        &query,
        json!({ "statementIds": statement_ids }),
        retry,
    )
    .await?;

    let mut by_id: HashMap<String, StatementRow> = HashMap::new();
    for row in rows {
        match serde_json::from_value::<StatementRow>(row["result"].clone()) {
            Ok(statement_row) => {
                if let Some(id) = statement_row.statement.statement_id.clone() {
                    by_id.insert(id, statement_row);
                }
            }
            Err(e) => warn!(error = %e, "discarding malformed statement row"),
        }
    }

    let mut results = Vec::with_capacity(statement_ids.len());
    for id in statement_ids {
        match by_id.remove(id) {
            Some(row) => results.push(row),
            None => warn!(statement_id = %id, "statement not found during batched fetch"),
        }
    }
    Ok(results)
}
