//! Error types for lexigraph-retrieval.

use thiserror::Error;

use lexigraph_core::error::CoreError;

/// Top-level error type for retrieval operations.
///
/// Backend and validation failures surface as [`CoreError`]; the variants
/// here cover failures specific to retrieval orchestration.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An operation that ranks by vector similarity was invoked on a query
    /// without an embedding.
    #[error("query embedding required for {operation}")]
    MissingQueryEmbedding {
        /// The operation that needed the embedding.
        operation: &'static str,
    },
}

/// Result type alias for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;
