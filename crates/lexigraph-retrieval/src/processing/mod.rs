//! Result processing: an ordered sequence of stateless processors
//! applied to a search result collection, plus a separately configurable
//! formatting chain that renders a display view.
//!
//! Each processor is a pure function from collection and query to
//! collection; the pipeline logs result/topic/statement counts around
//! every stage. The formatting chain never touches the processed
//! collection: it works on an independently derived display
//! representation, so the raw and display views can diverge without
//! re-querying.

pub mod clear;
pub mod dedup;
pub mod disaggregate;
pub mod filter;
pub mod format;
pub mod prune;
pub mod rerank;
pub mod rescore;
pub mod sort;
pub mod statement_strs;
pub mod truncate;

pub use clear::{ClearChunks, ClearScores};
pub use dedup::DedupResults;
pub use disaggregate::DisaggregateResults;
pub use filter::FilterByMetadata;
pub use format::{
    DisplayResult, DisplayTopic, FormatProcessor, FormatSources, FormattingPipeline,
    SimplifySingleTopicResults,
};
pub use prune::{PruneResults, PruneStatements};
pub use rerank::RerankStatements;
pub use rescore::{RescoreResults, ZeroScores};
pub use sort::SortResults;
pub use statement_strs::PopulateStatementStrs;
pub use truncate::{TruncateResults, TruncateStatements};

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use lexigraph_core::config::RetrievalConfig;
use lexigraph_core::error::CoreResult;
use lexigraph_core::metadata::FilterConfig;
use lexigraph_core::model::{SearchQuery, SearchResult, SearchResultCollection, Topic};
use lexigraph_core::store::Reranker;

/// One processing stage: a pure function over the collection.
#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(
        &self,
        collection: SearchResultCollection,
        query: &SearchQuery,
    ) -> SearchResultCollection;
}

/// An ordered chain of processors.
pub struct ResultProcessingPipeline {
    processors: Vec<Box<dyn Processor>>,
}

impl ResultProcessingPipeline {
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        Self { processors }
    }

    /// The stock chain: dedup, disaggregate, filter, materialize display
    /// strings, rerank, prune, rescore, sort, truncate, strip internals.
    pub fn with_defaults(
        config: &RetrievalConfig,
        filter_config: FilterConfig,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> CoreResult<Self> {
        Ok(Self::new(vec![
            Box::new(DedupResults),
            Box::new(DisaggregateResults),
            Box::new(FilterByMetadata::new(filter_config)),
            Box::new(PopulateStatementStrs),
            Box::new(RerankStatements::new(config, reranker)?),
            Box::new(PruneStatements::new(config.statement_pruning_factor)),
            Box::new(RescoreResults),
            Box::new(SortResults),
            Box::new(TruncateResults::new(config.max_search_results)),
            Box::new(TruncateStatements::new(config.max_statements_per_topic)),
            Box::new(ClearChunks),
            Box::new(ClearScores),
        ]))
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Run every processor in order.
    pub async fn run(
        &self,
        mut collection: SearchResultCollection,
        query: &SearchQuery,
    ) -> SearchResultCollection {
        let start = Instant::now();
        for processor in &self.processors {
            debug!(
                processor = processor.name(),
                results = collection.results.len(),
                topics = collection.topic_count(),
                statements = collection.statement_count(),
                "before"
            );
            collection = processor.process(collection, query).await;
            debug!(
                processor = processor.name(),
                results = collection.results.len(),
                topics = collection.topic_count(),
                statements = collection.statement_count(),
                "after"
            );
        }
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "processing complete"
        );
        collection
    }
}

/// Apply a handler to each result, keeping only results the handler
/// returns that still carry content.
pub(crate) fn retain_results(
    collection: SearchResultCollection,
    mut handler: impl FnMut(usize, SearchResult) -> Option<SearchResult>,
) -> SearchResultCollection {
    let SearchResultCollection {
        results,
        entities,
        entity_contexts,
    } = collection;
    let surviving = results
        .into_iter()
        .enumerate()
        .filter_map(|(index, result)| handler(index, result))
        .filter(|result| !result.topics.is_empty() || !result.statements.is_empty())
        .collect();
    SearchResultCollection {
        results: surviving,
        entities,
        entity_contexts,
    }
}

/// Apply a handler to each topic of one result, keeping only topics the
/// handler returns that still carry statements.
pub(crate) fn retain_topics(
    mut result: SearchResult,
    mut handler: impl FnMut(Topic) -> Option<Topic>,
) -> SearchResult {
    result.topics = std::mem::take(&mut result.topics)
        .into_iter()
        .filter_map(|topic| handler(topic))
        .filter(|topic| !topic.statements.is_empty())
        .collect();
    result
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use lexigraph_core::stubs::StubReranker;

    #[tokio::test]
    async fn default_pipeline_processes_a_simple_collection() {
        let config = RetrievalConfig::default();
        let pipeline =
            ResultProcessingPipeline::with_defaults(&config, FilterConfig::default(), None)
                .unwrap();
        assert_eq!(pipeline.len(), 12);

        let input = collection(vec![result(
            "src1",
            vec![topic(
                "Invoicing",
                vec![statement("s1", "Alice reviewed invoice 42", 1.0)],
            )],
            Some(1.0),
        )]);
        let query = SearchQuery::new("who reviewed invoice 42");
        let output = pipeline.run(input, &query).await;

        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].topics.len(), 1);
        assert_eq!(output.results[0].topics[0].statements.len(), 1);
        // Chunks and result scores are stripped at the end of the chain.
        assert!(output.results[0].topics[0].chunks.is_empty());
        assert!(output.results[0].score.is_none());
    }

    #[tokio::test]
    async fn model_strategy_without_reranker_fails_construction() {
        let config = RetrievalConfig {
            reranker: lexigraph_core::config::RerankerStrategy::Model,
            ..Default::default()
        };
        let result =
            ResultProcessingPipeline::with_defaults(&config, FilterConfig::default(), None);
        assert!(result.is_err());

        let with_model = ResultProcessingPipeline::with_defaults(
            &config,
            FilterConfig::default(),
            Some(Arc::new(StubReranker::new())),
        );
        assert!(with_model.is_ok());
    }

    #[tokio::test]
    async fn empty_pipeline_is_the_identity() {
        let pipeline = ResultProcessingPipeline::new(Vec::new());
        let input = collection(vec![result("src1", vec![], Some(1.0))]);
        let output = pipeline.run(input.clone(), &SearchQuery::new("q")).await;
        assert_eq!(output, input);
    }
}
