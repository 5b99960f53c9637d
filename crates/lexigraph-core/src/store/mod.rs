//! Store abstractions consumed by the retrieval engine.
//!
//! Backends are injected behind these traits; the engine never talks to a
//! concrete database. All traits assume the backend is safe for concurrent
//! read queries, so the engine performs no locking around them.

pub mod graph;
pub mod llm;
pub mod reranker;
pub mod retry;
pub mod vector;

pub use graph::{node_result, search_string_from, GraphStore, GraphStoreError, NodeId};
pub use llm::{Llm, PromptTemplate};
pub use reranker::Reranker;
pub use retry::with_backoff;
pub use vector::{EmbeddingRecord, VectorIndex, VectorStore};
