//! Graph store abstraction and query-text helpers.
//!
//! The engine issues parameterized structured queries and receives rows as
//! JSON objects. Node identity differs across backends: some expose a node
//! property (`entityId`), others only a native internal id. [`NodeId`]
//! abstracts the difference so the same query templates work against both.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{preview, CoreError, CoreResult};

/// Failure reported by a graph store backend.
///
/// Transient failures (network, throttling) are retried by [`run_query`];
/// permanent failures (malformed query) propagate immediately.
#[derive(Debug, Error)]
pub enum GraphStoreError {
    #[error("transient graph store failure: {0}")]
    Transient(String),
    #[error("permanent graph store failure: {0}")]
    Permanent(String),
}

impl GraphStoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GraphStoreError::Transient(_))
    }
}

/// Descriptor for a node identifier expression inside a query.
///
/// Property-based backends address nodes as `ref.property`; native-id
/// backends wrap the reference in an `id(...)` call. `Display` renders the
/// expression for interpolation into query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeId {
    expression: String,
    key: String,
    property_based: bool,
}

impl NodeId {
    /// A property-based identifier, e.g. `e.entityId`.
    pub fn from_property(field: &str) -> Self {
        let key = field.rsplit('.').next().unwrap_or(field).to_string();
        Self {
            expression: field.to_string(),
            key,
            property_based: true,
        }
    }

    /// A native identifier, e.g. `id(e)` for field `e.entityId`.
    pub fn from_native(field: &str) -> Self {
        let node_ref = field.split('.').next().unwrap_or(field);
        Self {
            expression: format!("id({node_ref})"),
            key: field.rsplit('.').next().unwrap_or(field).to_string(),
            property_based: false,
        }
    }

    pub fn is_property_based(&self) -> bool {
        self.property_based
    }

    /// The bare property/key name, without the node reference.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Build a map-projection selector for a node in a query return clause.
///
/// Produces `key: node_ref{.prop1, .prop2}`, including the id expression
/// when the backend is not property-based. `properties` defaults to all
/// (`*`) when empty is not desired by the caller.
pub fn node_result(node_ref: &str, node_id: Option<&NodeId>, properties: &[&str]) -> String {
    node_result_keyed(node_ref, node_id, properties, None)
}

/// [`node_result`] with an explicit key name differing from the node ref.
pub fn node_result_keyed(
    node_ref: &str,
    node_id: Option<&NodeId>,
    properties: &[&str],
    key_name: Option<&str>,
) -> String {
    let key = key_name.unwrap_or(node_ref);
    let mut selectors: Vec<String> = Vec::new();
    if let Some(id) = node_id {
        if id.is_property_based() {
            if !properties.contains(&id.key()) && !properties.contains(&"*") {
                selectors.push(format!(".{}", id.key()));
            }
        } else {
            selectors.push(format!("{}: {}", id.key(), id));
        }
    }
    selectors.extend(properties.iter().map(|p| format!(".{p}")));
    format!("{key}: {node_ref}{{{}}}", selectors.join(", "))
}

/// Normalize a value for exact-match lookup against indexed search strings:
/// punctuation stripped, whitespace collapsed, lowercased.
pub fn search_string_from(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_was_space = false;
    for c in value.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if c.is_whitespace() && !last_was_space && !out.is_empty() {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// A graph database consumed through parameterized structured queries.
///
/// `execute_query` must return zero rows (not an error) for no-match, and
/// must be safe for concurrent read queries.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Execute a parameterized query, returning one JSON object per row.
    async fn execute_query(
        &self,
        query: &str,
        parameters: Value,
    ) -> Result<Vec<Value>, GraphStoreError>;

    /// Identifier descriptor for the given `ref.property` field.
    fn node_id(&self, field: &str) -> NodeId;
}

/// Execute a query with bounded retries on transient failures.
///
/// Transient failures wait a randomized interval between attempts; a
/// permanent failure, or an exhausted retry budget, is wrapped with the
/// query reference and parameters for diagnosis.
pub async fn run_query(
    store: &dyn GraphStore,
    query: &str,
    parameters: Value,
    retry: &RetryConfig,
) -> CoreResult<Vec<Value>> {
    let params_preview = preview(&parameters.to_string());
    let mut last_message = String::new();

    for attempt in 1..=retry.max_attempts {
        match store.execute_query(query, parameters.clone()).await {
            Ok(rows) => return Ok(rows),
            Err(err) if err.is_transient() && attempt < retry.max_attempts => {
                last_message = err.to_string();
                warn!(attempt, error = %err, "transient graph query failure, retrying");
                super::retry::backoff_sleep(retry, attempt).await;
            }
            Err(err) => {
                return Err(CoreError::GraphQuery {
                    query: preview(query),
                    parameters: params_preview,
                    message: err.to_string(),
                });
            }
        }
    }

    Err(CoreError::GraphQuery {
        query: preview(query),
        parameters: params_preview,
        message: format!("retries exhausted: {last_message}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_node_id_renders_field() {
        let id = NodeId::from_property("e.entityId");
        assert_eq!(id.to_string(), "e.entityId");
        assert_eq!(id.key(), "entityId");
        assert!(id.is_property_based());
    }

    #[test]
    fn native_node_id_wraps_ref() {
        let id = NodeId::from_native("e.entityId");
        assert_eq!(id.to_string(), "id(e)");
        assert!(!id.is_property_based());
    }

    #[test]
    fn node_result_includes_id_property() {
        let id = NodeId::from_property("entity.entityId");
        let selector = node_result("entity", Some(&id), &["value", "class"]);
        assert_eq!(selector, "entity: entity{.entityId, .value, .class}");
    }

    #[test]
    fn node_result_with_native_id_embeds_expression() {
        let id = NodeId::from_native("entity.entityId");
        let selector = node_result("entity", Some(&id), &["value"]);
        assert_eq!(selector, "entity: entity{entityId: id(entity), .value}");
    }

    #[test]
    fn search_string_strips_punctuation_and_case() {
        assert_eq!(search_string_from("  Invoice #42, Q1! "), "invoice 42 q1");
        assert_eq!(search_string_from("A--B"), "ab");
    }
}
