//! Lexigraph core library.
//!
//! Defines the domain model for graph-grounded evidence (entities, facts,
//! statements, topics, sources), the store abstractions the retrieval
//! engine consumes (graph store, vector store, reranker, language model),
//! configuration and error types, and in-memory stub backends for tests.
//!
//! # Example
//!
//! ```
//! use lexigraph_core::config::RetrievalConfig;
//! use lexigraph_core::model::SearchQuery;
//!
//! let config = RetrievalConfig::default();
//! assert!(config.validate().is_ok());
//!
//! let query = SearchQuery::new("who reviewed invoice 42?");
//! assert!(query.embedding.is_none());
//! ```

pub mod config;
pub mod error;
pub mod metadata;
pub mod model;
pub mod store;
pub mod stubs;

// Re-exports for convenience
pub use config::RetrievalConfig;
pub use error::{CoreError, CoreResult};
pub use metadata::FilterConfig;
