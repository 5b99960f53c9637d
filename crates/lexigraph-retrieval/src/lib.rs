//! Semantic-guided graph retrieval engine.
//!
//! Turns a natural-language query into a ranked, deduplicated collection
//! of graph-grounded evidence. Candidate generation combines keyword
//! extraction, entity resolution and vector similarity; graph traversal
//! expands candidates through entity-context trees and bounded beam
//! search over the statement graph; a composable processing pipeline
//! dedups, reranks, prunes and formats the results.
//!
//! Store backends (graph, vector, reranker, language model) are consumed
//! through the traits in [`lexigraph_core`]; nothing here talks to a
//! concrete database.
//!
//! # Example
//!
//! ```
//! use lexigraph_core::config::RetrievalConfig;
//! use lexigraph_core::metadata::FilterConfig;
//! use lexigraph_retrieval::processing::ResultProcessingPipeline;
//!
//! let config = RetrievalConfig::default();
//! let pipeline =
//!     ResultProcessingPipeline::with_defaults(&config, FilterConfig::default(), None).unwrap();
//! assert!(pipeline.len() > 0);
//! ```

pub mod cache;
pub mod error;
pub mod processing;
pub mod prompts;
pub mod query;
pub mod retrievers;
pub mod utils;

// Re-exports for convenience
pub use cache::{SharedEmbeddingCache, SharedNeighbourCache};
pub use error::{RetrievalError, RetrievalResult};
pub use processing::{FormattingPipeline, ResultProcessingPipeline};
pub use query::{QueryContext, QueryContextBuilder};
pub use retrievers::{CompositeRetriever, SemanticGuidedRetriever};
