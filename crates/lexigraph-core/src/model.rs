//! Domain model for graph-grounded evidence.
//!
//! Every type here is constructed fresh per retrieval call from graph-store
//! query rows and discarded after the final evidence list is returned;
//! nothing is persisted by this subsystem. Field names use the graph's
//! camelCase id convention (`entityId`, `statementId`, …) so rows
//! deserialize directly and evidence round-trips serialize/deserialize
//! unchanged.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A natural-language query plus its optional embedding.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SearchQuery {
    /// Raw query text.
    pub text: String,
    /// Query embedding, when the caller has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl SearchQuery {
    /// Create a query from text alone.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            embedding: None,
        }
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A named thing in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub entity_id: String,
    pub value: String,
    /// Classification label, e.g. `Person` or `Organization`.
    #[serde(
        default,
        alias = "class",
        skip_serializing_if = "Option::is_none"
    )]
    pub classification: Option<String>,
}

/// An entity paired with its relation-count-derived score.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredEntity {
    pub entity: Entity,
    pub score: f64,
    /// Score assigned by a reranker pass, when one ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reranking_score: Option<f64>,
}

impl ScoredEntity {
    pub fn new(entity: Entity, score: f64) -> Self {
        Self {
            entity,
            score,
            reranking_score: None,
        }
    }

    /// Descending comparison: primary score first, then reranking score.
    pub fn cmp_desc(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| match (other.reranking_score, self.reranking_score) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            })
    }
}

/// Sort scored entities descending by score, then reranking score.
pub fn sort_scored_entities(entities: &mut [ScoredEntity]) {
    entities.sort_by(|a, b| a.cmp_desc(b));
}

/// An atomic subject-predicate-object unit supporting a statement.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<String>,
    pub subject: Entity,
    pub predicate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
}

impl Fact {
    /// Render the fact as a single display phrase.
    pub fn display_value(&self) -> String {
        let mut parts = vec![self.subject.value.clone(), self.predicate.clone()];
        if let Some(object) = &self.object {
            parts.push(object.value.clone());
        }
        if let Some(complement) = &self.complement {
            parts.push(complement.clone());
        }
        parts.join(" ")
    }
}

/// A natural-language assertion grounded in one or more facts.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub score: f64,
    /// Materialized display string; populated by the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_str: Option<String>,
}

/// A text unit extracted from a source document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub chunk_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A cluster of related statements extracted from one or more chunks.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(alias = "topic")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunk_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<Chunk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<Statement>,
}

/// Identifier and metadata of an originating document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// A source as carried by a search result: either the full source record,
/// or a display label once the formatting pipeline has run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceInfo {
    Source(Source),
    Label(String),
}

impl SourceInfo {
    /// Key used for grouping and deduplication.
    pub fn key(&self) -> &str {
        match self {
            SourceInfo::Source(s) => &s.source_id,
            SourceInfo::Label(l) => l,
        }
    }

    /// Source metadata, when still available.
    pub fn metadata(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            SourceInfo::Source(s) => Some(&s.metadata),
            SourceInfo::Label(_) => None,
        }
    }
}

impl Default for SourceInfo {
    fn default() -> Self {
        SourceInfo::Label(String::new())
    }
}

impl From<Source> for SourceInfo {
    fn from(source: Source) -> Self {
        SourceInfo::Source(source)
    }
}

/// One unit of retrieved evidence: a source with its matched topics.
///
/// `topic` and `statements` are only populated by the display
/// simplification step for single-topic results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub source: SourceInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<Topic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// The unit passed between pipeline stages: results plus the entities and
/// entity contexts that guided retrieval.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultCollection {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<ScoredEntity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_contexts: Vec<Vec<ScoredEntity>>,
}

impl SearchResultCollection {
    /// Append one search result.
    pub fn add_search_result(&mut self, result: SearchResult) {
        self.results.push(result);
    }

    /// Append a discovered entity.
    ///
    /// Entities are unioned, not merged: the same entity discovered by two
    /// subqueries appears twice until downstream stages decide otherwise.
    pub fn add_entity(&mut self, entity: ScoredEntity) {
        self.entities.push(entity);
    }

    /// Replace the result list, keeping entities and contexts.
    pub fn with_new_results(mut self, results: Vec<SearchResult>) -> Self {
        self.results = results;
        self
    }

    /// Total statement count across all results and topics.
    pub fn statement_count(&self) -> usize {
        self.results
            .iter()
            .flat_map(|r| r.topics.iter())
            .map(|t| t.statements.len())
            .sum()
    }

    /// Total topic count across all results.
    pub fn topic_count(&self) -> usize {
        self.results.iter().map(|r| r.topics.len()).sum()
    }
}
