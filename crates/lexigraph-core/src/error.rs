//! Error types for lexigraph-core.
//!
//! Defines the central [`CoreError`] used throughout the core crate along
//! with the [`CoreResult<T>`] alias. Store backends report failures through
//! their own error types (see [`crate::store::graph::GraphStoreError`]);
//! those are classified and wrapped into `CoreError` variants at the point
//! where retries have been exhausted.

use thiserror::Error;

/// Maximum number of characters of query text / parameters carried inside
/// an error message before truncation.
pub const ERROR_PREVIEW_LEN: usize = 256;

/// Truncate a diagnostic string for inclusion in an error message.
pub fn preview(s: &str) -> String {
    if s.len() <= ERROR_PREVIEW_LEN {
        s.to_string()
    } else {
        let mut end = ERROR_PREVIEW_LEN;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

/// Top-level error type for core operations.
///
/// Provides structured variants for all failure modes surfaced by the
/// store abstractions and the domain model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A graph query failed permanently, or exhausted its retry budget.
    ///
    /// Carries the query reference and parameters (both truncated) so a
    /// failing query can be reproduced against the backend directly.
    #[error("graph query failed: {message} [query: {query}, parameters: {parameters}]")]
    GraphQuery {
        /// Truncated query text.
        query: String,
        /// Truncated JSON rendering of the query parameters.
        parameters: String,
        /// Backend-reported failure description.
        message: String,
    },

    /// A vector index operation failed.
    #[error("vector index error: {0}")]
    VectorIndex(String),

    /// The named vector index does not exist on the configured store.
    #[error("unknown vector index: {0}")]
    UnknownIndex(String),

    /// The reranker backend failed to score a batch.
    #[error("reranker error: {0}")]
    Reranker(String),

    /// A language-model call failed.
    #[error("language model error: {0}")]
    Llm(String),

    /// A field value failed validation constraints.
    #[error("validation error: {field} - {message}")]
    Validation {
        /// Name of the field that failed validation.
        field: String,
        /// Description of the validation failure.
        message: String,
    },

    /// A required capability is missing on an injected collaborator.
    ///
    /// Raised eagerly at construction time, never deferred to first use.
    #[error("missing capability on {component}: {capability}")]
    MissingCapability {
        /// The collaborator that was inspected.
        component: String,
        /// The capability it lacks.
        capability: String,
    },

    /// Configuration is invalid or missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error during serialization or deserialization.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
