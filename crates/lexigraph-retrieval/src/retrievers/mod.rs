//! Retrievers: traversal-based graph search, beam search over the
//! statement graph, and the semantic-guided orchestrator.

pub mod beam;
pub mod chunk_based;
pub mod composite;
pub mod entity_based;
pub mod hit;
pub mod keyword_ranking;
pub mod semantic_guided;
pub mod statement_cosine;
pub mod traversal;

pub use beam::{RerankingBeamSearch, SemanticBeamSearch};
pub use chunk_based::ChunkBasedSearch;
pub use composite::{CompositeRetriever, TraversalKind, WeightedTraversal};
pub use entity_based::EntityBasedSearch;
pub use hit::{SearchType, StatementHit};
pub use keyword_ranking::KeywordRankingSearch;
pub use semantic_guided::SemanticGuidedRetriever;
pub use statement_cosine::StatementCosineSearch;
pub use traversal::{TraversalLimits, TraversalRetriever};

use async_trait::async_trait;

use lexigraph_core::model::SearchQuery;

use crate::error::RetrievalResult;

/// A retriever that resolves a query directly into scored statement hits.
///
/// Implementations emit bare statement ids with scores; the statement,
/// chunk and source are materialized later in one batched fetch by the
/// orchestrator.
#[async_trait]
pub trait SemanticRetriever: Send + Sync {
    fn name(&self) -> &'static str;

    async fn retrieve_hits(&self, query: &SearchQuery) -> RetrievalResult<Vec<StatementHit>>;
}

/// A retriever that expands seed statement hits through the graph.
///
/// With an empty `shared_hits` slice the implementation falls back to its
/// own seeding strategy (initial retrievers or a vector-similarity
/// lookup).
#[async_trait]
pub trait BeamRetriever: Send + Sync {
    fn name(&self) -> &'static str;

    async fn expand(
        &self,
        query: &SearchQuery,
        shared_hits: &[StatementHit],
    ) -> RetrievalResult<Vec<StatementHit>>;
}
