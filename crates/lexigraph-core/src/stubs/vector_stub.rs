//! Brute-force in-memory vector store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::metadata::FilterConfig;
use crate::model::SearchQuery;
use crate::store::{EmbeddingRecord, VectorIndex, VectorStore};

/// One indexed element: id, embedding, and the row returned by `top_k`.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub row: Value,
}

#[derive(Default)]
struct InMemoryVectorIndex {
    records: Mutex<Vec<VectorRecord>>,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

fn row_passes_filter(row: &Value, filter: Option<&FilterConfig>) -> bool {
    let Some(filter) = filter else { return true };
    let Some(metadata) = row.pointer("/source/metadata").and_then(|m| m.as_object()) else {
        return true;
    };
    let metadata = metadata
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect();
    filter.matches_source_metadata(&metadata)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn top_k(
        &self,
        query: &SearchQuery,
        top_k: usize,
        filter: Option<&FilterConfig>,
    ) -> CoreResult<Vec<Value>> {
        let records = self.records.lock();
        let mut scored: Vec<(f32, Value)> = records
            .iter()
            .filter(|r| row_passes_filter(&r.row, filter))
            .map(|r| {
                let score = query
                    .embedding
                    .as_deref()
                    .map(|q| cosine(q, &r.embedding))
                    .unwrap_or(0.0);
                let mut row = r.row.clone();
                if let Some(obj) = row.as_object_mut() {
                    obj.entry("score").or_insert_with(|| score.into());
                }
                (score, row)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(top_k).map(|(_, row)| row).collect())
    }

    async fn get_embeddings(&self, ids: &[String]) -> CoreResult<Vec<EmbeddingRecord>> {
        let records = self.records.lock();
        let by_id: HashMap<&str, &VectorRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();
        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()))
            .map(|r| EmbeddingRecord {
                id: r.id.clone(),
                embedding: r.embedding.clone(),
            })
            .collect())
    }
}

/// A vector store holding named brute-force indexes.
#[derive(Default)]
pub struct InMemoryVectorStore {
    indexes: HashMap<String, Arc<InMemoryVectorIndex>>,
}

impl InMemoryVectorStore {
    /// Create a store with the given (initially empty) indexes.
    pub fn with_indexes(names: &[&str]) -> Self {
        let indexes = names
            .iter()
            .map(|n| (n.to_string(), Arc::new(InMemoryVectorIndex::default())))
            .collect();
        Self { indexes }
    }

    /// Add a record to a named index.
    pub fn add_record(&self, index: &str, record: VectorRecord) -> CoreResult<()> {
        let idx = self
            .indexes
            .get(index)
            .ok_or_else(|| CoreError::UnknownIndex(index.to_string()))?;
        idx.records.lock().push(record);
        Ok(())
    }
}

impl VectorStore for InMemoryVectorStore {
    fn get_index(&self, name: &str) -> CoreResult<Arc<dyn VectorIndex>> {
        self.indexes
            .get(name)
            .cloned()
            .map(|idx| idx as Arc<dyn VectorIndex>)
            .ok_or_else(|| CoreError::UnknownIndex(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding,
            row: json!({"statement": {"statementId": id}}),
        }
    }

    #[tokio::test]
    async fn top_k_orders_by_cosine_similarity() {
        let store = InMemoryVectorStore::with_indexes(&["statement"]);
        store.add_record("statement", record("s1", vec![1.0, 0.0])).unwrap();
        store.add_record("statement", record("s2", vec![0.0, 1.0])).unwrap();
        store.add_record("statement", record("s3", vec![0.9, 0.1])).unwrap();

        let index = store.get_index("statement").unwrap();
        let query = SearchQuery::new("q").with_embedding(vec![1.0, 0.0]);
        let rows = index.top_k(&query, 2, None).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["statement"]["statementId"], "s1");
        assert_eq!(rows[1]["statement"]["statementId"], "s3");
    }

    #[tokio::test]
    async fn get_embeddings_skips_unknown_ids() {
        let store = InMemoryVectorStore::with_indexes(&["statement"]);
        store.add_record("statement", record("s1", vec![1.0])).unwrap();
        let index = store.get_index("statement").unwrap();
        let records = index
            .get_embeddings(&["s1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "s1");
    }

    #[test]
    fn unknown_index_is_an_error() {
        let store = InMemoryVectorStore::with_indexes(&["statement"]);
        assert!(store.get_index("chunk").is_err());
    }
}
