//! Canned-response graph store.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::store::{GraphStore, GraphStoreError, NodeId};

/// A graph store that answers queries from canned rows.
///
/// Responses are registered against a tag; the first tag found as a
/// substring of the query text wins. Unmatched queries return zero rows,
/// matching the no-match contract of real backends.
#[derive(Default)]
pub struct StubGraphStore {
    responses: Mutex<Vec<(String, Vec<Value>)>>,
    queries: Mutex<Vec<String>>,
    transient_failures: AtomicUsize,
    permanent_failure: Mutex<Option<String>>,
    native_ids: bool,
}

impl StubGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use native `id(...)` identifiers instead of property-based ones.
    pub fn with_native_ids(mut self) -> Self {
        self.native_ids = true;
        self
    }

    /// Register canned rows for queries containing `tag`.
    pub fn with_rows(self, tag: &str, rows: Vec<Value>) -> Self {
        self.responses.lock().push((tag.to_string(), rows));
        self
    }

    /// Fail the next `n` queries with a transient error.
    pub fn fail_transient(&self, n: usize) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every query permanently with the given message.
    pub fn fail_permanently(&self, message: &str) {
        *self.permanent_failure.lock() = Some(message.to_string());
    }

    /// Number of queries executed so far.
    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }

    /// Copy of the executed query texts, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl GraphStore for StubGraphStore {
    async fn execute_query(
        &self,
        query: &str,
        _parameters: Value,
    ) -> Result<Vec<Value>, GraphStoreError> {
        self.queries.lock().push(query.to_string());

        if let Some(message) = self.permanent_failure.lock().as_ref() {
            return Err(GraphStoreError::Permanent(message.clone()));
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .transient_failures
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(GraphStoreError::Transient("stub outage".to_string()));
        }

        let responses = self.responses.lock();
        for (tag, rows) in responses.iter() {
            if query.contains(tag.as_str()) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }

    fn node_id(&self, field: &str) -> NodeId {
        if self.native_ids {
            NodeId::from_native(field)
        } else {
            NodeId::from_property(field)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::store::graph::run_query;
    use serde_json::json;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn unmatched_query_returns_zero_rows() {
        let store = StubGraphStore::new();
        let rows = store.execute_query("MATCH (n)", json!({})).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn tagged_rows_are_returned() {
        let store = StubGraphStore::new().with_rows("entity search", vec![json!({"result": 1})]);
        let rows = store
            .execute_query("// entity search\nMATCH (e)", json!({}))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn run_query_retries_transient_failures() {
        let store = StubGraphStore::new().with_rows("n", vec![json!({"ok": true})]);
        store.fail_transient(2);
        let rows = run_query(&store, "MATCH (n)", json!({}), &fast_retry())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.query_count(), 3);
    }

    #[tokio::test]
    async fn run_query_wraps_permanent_failures_immediately() {
        let store = StubGraphStore::new();
        store.fail_permanently("syntax error");
        let err = run_query(&store, "MATCH (n)", json!({"k": "v"}), &fast_retry())
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("syntax error"));
        assert!(text.contains("MATCH (n)"));
        assert_eq!(store.query_count(), 1);
    }
}
