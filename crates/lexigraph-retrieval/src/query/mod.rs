//! Query context: the keywords, entities and entity contexts derived from
//! a query before any graph traversal runs.

pub mod decomposition;
pub mod entities;
pub mod entity_context;
pub mod keywords;

pub use decomposition::QueryDecomposer;
pub use entities::EntityResolver;
pub use entity_context::EntityContextBuilder;
pub use keywords::{KeywordExtractor, LlmKeywordExtractor, PassThruKeywordExtractor};

use std::sync::Arc;

use tracing::debug;

use lexigraph_core::error::CoreResult;
use lexigraph_core::model::{ScoredEntity, SearchQuery};

/// Entities and entity contexts resolved for one query (or subquery).
///
/// Built once per query and passed read-only into every retriever that
/// participates in the call.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub entities: Vec<ScoredEntity>,
    pub entity_contexts: Vec<Vec<ScoredEntity>>,
}

impl QueryContext {
    /// Ids of the leading entity of each context, used as traversal
    /// start nodes.
    pub fn start_entity_ids(&self) -> Vec<String> {
        self.entity_contexts
            .iter()
            .filter_map(|context| context.first())
            .map(|scored| scored.entity.entity_id.clone())
            .collect()
    }
}

/// Derives a [`QueryContext`] by chaining keyword extraction, entity
/// resolution and entity-context expansion.
pub struct QueryContextBuilder {
    keyword_extractor: Arc<dyn KeywordExtractor>,
    entity_resolver: Arc<EntityResolver>,
    context_builder: Arc<EntityContextBuilder>,
    expand_entities: bool,
}

impl QueryContextBuilder {
    pub fn new(
        keyword_extractor: Arc<dyn KeywordExtractor>,
        entity_resolver: Arc<EntityResolver>,
        context_builder: Arc<EntityContextBuilder>,
    ) -> Self {
        Self {
            keyword_extractor,
            entity_resolver,
            context_builder,
            expand_entities: false,
        }
    }

    /// Top up resolved entities with graph neighbours before building
    /// contexts.
    pub fn with_entity_expansion(mut self, expand_entities: bool) -> Self {
        self.expand_entities = expand_entities;
        self
    }

    /// Resolve the query context.
    ///
    /// Keyword extraction and entity resolution degrade to empty rather
    /// than failing the call; context expansion errors propagate.
    pub async fn build(&self, query: &SearchQuery) -> CoreResult<QueryContext> {
        let keywords = self.keyword_extractor.get_keywords(query).await;
        debug!(count = keywords.len(), "keywords extracted");

        let mut entities = self.entity_resolver.get_entities(&keywords).await;
        if self.expand_entities {
            entities = self.entity_resolver.expand_entities(entities).await?;
        }
        debug!(count = entities.len(), "entities resolved");

        let entity_contexts = self
            .context_builder
            .get_entity_contexts(&entities, query)
            .await?;
        debug!(count = entity_contexts.len(), "entity contexts built");

        Ok(QueryContext {
            entities,
            entity_contexts,
        })
    }
}
