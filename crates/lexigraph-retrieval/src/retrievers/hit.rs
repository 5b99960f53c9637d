//! Statement-level hits produced by the semantic-guided retrievers.

use lexigraph_core::model::{Chunk, Source, Statement, Topic};

/// Which search produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    CosineSimilarity,
    KeywordRanking,
    BeamSearch,
}

/// One retrieved statement reference with its score and provenance.
///
/// Initial retrievers emit bare ids; the statement, topic, chunk and
/// source are materialized later in one batched fetch.
#[derive(Debug, Clone)]
pub struct StatementHit {
    pub statement_id: String,
    pub score: f64,
    pub search_type: SearchType,
    /// Seed-to-hit statement path, for beam-search hits.
    pub path: Vec<String>,
    pub statement: Option<Statement>,
    pub topic: Option<Topic>,
    pub chunk: Option<Chunk>,
    pub source: Option<Source>,
}

impl StatementHit {
    pub fn new(statement_id: impl Into<String>, score: f64, search_type: SearchType) -> Self {
        Self {
            statement_id: statement_id.into(),
            score,
            search_type,
            path: Vec::new(),
            statement: None,
            topic: None,
            chunk: None,
            source: None,
        }
    }

    /// Expansion depth for beam-search hits (path length).
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}
