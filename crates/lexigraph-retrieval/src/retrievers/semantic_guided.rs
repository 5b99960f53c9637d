//! Semantic-guided retrieval orchestrator.
//!
//! Runs the initial retrievers concurrently, unions their hits (first
//! occurrence of a statement id wins), optionally feeds the union as
//! seeds into the beam retrievers, materializes every surviving id in one
//! batched fetch, filters by source metadata, and groups the final list
//! by source so evidence from the same document stays together.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error};

use lexigraph_core::config::RetrievalConfig;
use lexigraph_core::error::{CoreError, CoreResult};
use lexigraph_core::metadata::FilterConfig;
use lexigraph_core::model::{SearchQuery, SearchResult, SearchResultCollection, Topic};
use lexigraph_core::store::GraphStore;

use crate::error::RetrievalResult;
use crate::utils::parallel_map;
use crate::utils::statements::{get_statements, StatementRow};

use super::hit::StatementHit;
use super::{BeamRetriever, SemanticRetriever};

pub struct SemanticGuidedRetriever {
    graph_store: Arc<dyn GraphStore>,
    initial_retrievers: Vec<Arc<dyn SemanticRetriever>>,
    beam_retrievers: Vec<Arc<dyn BeamRetriever>>,
    share_results: bool,
    config: RetrievalConfig,
    filter_config: FilterConfig,
}

impl SemanticGuidedRetriever {
    pub fn new(
        graph_store: Arc<dyn GraphStore>,
        initial_retrievers: Vec<Arc<dyn SemanticRetriever>>,
        beam_retrievers: Vec<Arc<dyn BeamRetriever>>,
        config: RetrievalConfig,
        filter_config: FilterConfig,
    ) -> CoreResult<Self> {
        if initial_retrievers.is_empty() {
            return Err(CoreError::Validation {
                field: "initial_retrievers".to_string(),
                message: "at least one initial retriever is required".to_string(),
            });
        }
        Ok(Self {
            graph_store,
            initial_retrievers,
            beam_retrievers,
            share_results: true,
            config,
            filter_config,
        })
    }

    /// Disable seeding the beam retrievers with the initial hits. With
    /// sharing off the beam retrievers do not run at all.
    pub fn with_share_results(mut self, share_results: bool) -> Self {
        self.share_results = share_results;
        self
    }

    /// Retrieve, expand, materialize and order statement hits.
    ///
    /// A failing sub-retriever is logged and its contribution excluded;
    /// only the final batched fetch can fail the call.
    pub async fn retrieve(&self, query: &SearchQuery) -> RetrievalResult<Vec<StatementHit>> {
        let batches = parallel_map(
            self.initial_retrievers.clone(),
            self.initial_retrievers.len(),
            |retriever| {
                let query = query.clone();
                async move { (retriever.name(), retriever.retrieve_hits(&query).await) }
            },
        )
        .await;

        let mut seen_statement_ids: HashSet<String> = HashSet::new();
        let mut hits: Vec<StatementHit> = Vec::new();
        for (name, batch) in batches {
            match batch {
                Ok(batch) => {
                    for hit in batch {
                        if seen_statement_ids.insert(hit.statement_id.clone()) {
                            hits.push(hit);
                        }
                    }
                }
                Err(e) => {
                    error!(retriever = name, error = %e, "initial retriever failed, excluding its results");
                }
            }
        }
        debug!(count = hits.len(), "initial hits");

        if self.share_results && !hits.is_empty() {
            let shared = hits.clone();
            for retriever in &self.beam_retrievers {
                match retriever.expand(query, &shared).await {
                    Ok(expanded) => {
                        for hit in expanded {
                            if seen_statement_ids.insert(hit.statement_id.clone()) {
                                hits.push(hit);
                            }
                        }
                    }
                    Err(e) => {
                        error!(retriever = retriever.name(), error = %e, "beam retriever failed, excluding its results");
                    }
                }
            }
        }
        debug!(count = hits.len(), "hits after graph expansion");

        if hits.is_empty() {
            return Ok(hits);
        }

        // One batched fetch for every surviving id.
        let statement_ids: Vec<String> = hits.iter().map(|h| h.statement_id.clone()).collect();
        let rows = get_statements(&*self.graph_store, &self.config.retry, &statement_ids).await?;
        let mut rows_by_id: HashMap<String, StatementRow> = rows
            .into_iter()
            .filter_map(|row| {
                row.statement
                    .statement_id
                    .clone()
                    .map(|id| (id, row))
            })
            .collect();

        let mut materialized: Vec<StatementHit> = Vec::new();
        for mut hit in hits {
            let Some(row) = rows_by_id.remove(&hit.statement_id) else {
                continue;
            };
            hit.statement = Some(row.statement);
            hit.topic = row.topic;
            hit.chunk = row.chunk;
            hit.source = Some(row.source);
            materialized.push(hit);
        }

        let filtered: Vec<StatementHit> = materialized
            .into_iter()
            .filter(|hit| {
                hit.source
                    .as_ref()
                    .map(|source| self.filter_config.matches_source_metadata(&source.metadata))
                    .unwrap_or(false)
            })
            .collect();
        debug!(count = filtered.len(), "hits after metadata filter");

        // Group by source in first-seen order; best statements first
        // within each group.
        let mut source_order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<StatementHit>> = HashMap::new();
        for hit in filtered {
            let source_id = hit
                .source
                .as_ref()
                .map(|s| s.source_id.clone())
                .unwrap_or_default();
            if !groups.contains_key(&source_id) {
                source_order.push(source_id.clone());
            }
            groups.entry(source_id).or_default().push(hit);
        }

        let mut ordered: Vec<StatementHit> = Vec::new();
        for source_id in source_order {
            if let Some(mut group) = groups.remove(&source_id) {
                group.sort_by(|a, b| b.score.total_cmp(&a.score));
                ordered.extend(group);
            }
        }

        debug!(count = ordered.len(), "ordered hits");
        Ok(ordered)
    }

    /// Retrieve and shape the hits into a result collection for the
    /// processing pipeline.
    pub async fn retrieve_collection(
        &self,
        query: &SearchQuery,
    ) -> RetrievalResult<SearchResultCollection> {
        let hits = self.retrieve(query).await?;
        Ok(hits_to_collection(hits))
    }
}

/// Group materialized hits into a result collection: one result per
/// source, statements nested under their topics, each statement carrying
/// its hit score. Hits that were never materialized are dropped.
pub fn hits_to_collection(hits: Vec<StatementHit>) -> SearchResultCollection {
    let mut source_order: Vec<String> = Vec::new();
    let mut results: HashMap<String, SearchResult> = HashMap::new();

    for hit in hits {
        let (Some(mut statement), Some(source)) = (hit.statement, hit.source) else {
            continue;
        };
        statement.score = hit.score;

        let source_id = source.source_id.clone();
        let result = results.entry(source_id.clone()).or_insert_with(|| {
            source_order.push(source_id);
            SearchResult {
                source: source.into(),
                ..Default::default()
            }
        });

        let topic_value = hit
            .topic
            .as_ref()
            .map(|t| t.value.clone())
            .unwrap_or_default();
        match result.topics.iter().position(|t| t.value == topic_value) {
            Some(index) => result.topics[index].statements.push(statement),
            None => {
                let mut topic = hit.topic.unwrap_or_else(|| Topic {
                    value: topic_value,
                    ..Default::default()
                });
                topic.statements = vec![statement];
                result.topics.push(topic);
            }
        }
    }

    let mut collection = SearchResultCollection::default();
    for source_id in source_order {
        if let Some(mut result) = results.remove(&source_id) {
            let best = result
                .topics
                .iter()
                .flat_map(|t| t.statements.iter())
                .map(|s| s.score)
                .fold(f64::MIN, f64::max);
            result.score = (best > f64::MIN).then_some(best);
            collection.add_search_result(result);
        }
    }
    collection
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lexigraph_core::metadata::MetadataFilter;
    use lexigraph_core::model::{Source, Statement};
    use lexigraph_core::stubs::StubGraphStore;
    use serde_json::json;

    use crate::retrievers::hit::SearchType;

    /// Initial retriever with canned hits.
    struct FixedRetriever {
        name: &'static str,
        hits: Vec<(String, f64)>,
    }

    #[async_trait]
    impl SemanticRetriever for FixedRetriever {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn retrieve_hits(&self, _query: &SearchQuery) -> RetrievalResult<Vec<StatementHit>> {
            Ok(self
                .hits
                .iter()
                .map(|(id, score)| StatementHit::new(id.clone(), *score, SearchType::CosineSimilarity))
                .collect())
        }
    }

    /// Beam retriever that records the seeds it was given.
    struct FixedBeam {
        hits: Vec<String>,
    }

    #[async_trait]
    impl BeamRetriever for FixedBeam {
        fn name(&self) -> &'static str {
            "FixedBeam"
        }

        async fn expand(
            &self,
            _query: &SearchQuery,
            shared_hits: &[StatementHit],
        ) -> RetrievalResult<Vec<StatementHit>> {
            assert!(!shared_hits.is_empty());
            Ok(self
                .hits
                .iter()
                .map(|id| StatementHit::new(id.clone(), 0.0, SearchType::BeamSearch))
                .collect())
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl SemanticRetriever for FailingRetriever {
        fn name(&self) -> &'static str {
            "FailingRetriever"
        }

        async fn retrieve_hits(&self, _query: &SearchQuery) -> RetrievalResult<Vec<StatementHit>> {
            Err(CoreError::VectorIndex("index offline".to_string()).into())
        }
    }

    fn statement_row(id: &str, value: &str, source: &str) -> serde_json::Value {
        json!({
            "result": {
                "statement": { "statementId": id, "value": value },
                "topic": { "topicId": "t1", "value": "Invoicing" },
                "chunk": { "chunkId": "c1" },
                "source": { "sourceId": source, "metadata": { "lang": "en" } }
            }
        })
    }

    fn retriever_with(
        graph: Arc<StubGraphStore>,
        initial: Vec<Arc<dyn SemanticRetriever>>,
        beams: Vec<Arc<dyn BeamRetriever>>,
        filter: FilterConfig,
    ) -> SemanticGuidedRetriever {
        SemanticGuidedRetriever::new(graph, initial, beams, RetrievalConfig::default(), filter)
            .unwrap()
    }

    #[tokio::test]
    async fn first_retriever_wins_duplicate_statement_ids() {
        let graph = Arc::new(StubGraphStore::new().with_rows(
            "materialize statements",
            vec![statement_row("s1", "one", "src1")],
        ));
        let retriever = retriever_with(
            graph,
            vec![
                Arc::new(FixedRetriever {
                    name: "a",
                    hits: vec![("s1".to_string(), 0.9)],
                }),
                Arc::new(FixedRetriever {
                    name: "b",
                    hits: vec![("s1".to_string(), 0.1)],
                }),
            ],
            vec![],
            FilterConfig::default(),
        );

        let hits = retriever.retrieve(&SearchQuery::new("q")).await.unwrap();
        assert_eq!(hits.len(), 1);
        // The score comes from whichever retriever returned the id first.
        assert_eq!(hits[0].score, 0.9);
    }

    #[tokio::test]
    async fn beam_hits_are_deduped_against_initial_hits() {
        let graph = Arc::new(StubGraphStore::new().with_rows(
            "materialize statements",
            vec![
                statement_row("s1", "one", "src1"),
                statement_row("s2", "two", "src1"),
            ],
        ));
        let retriever = retriever_with(
            graph,
            vec![Arc::new(FixedRetriever {
                name: "a",
                hits: vec![("s1".to_string(), 0.9)],
            })],
            vec![Arc::new(FixedBeam {
                hits: vec!["s1".to_string(), "s2".to_string()],
            })],
            FilterConfig::default(),
        );

        let hits = retriever.retrieve(&SearchQuery::new("q")).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.statement_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn failing_initial_retriever_is_excluded_not_fatal() {
        let graph = Arc::new(StubGraphStore::new().with_rows(
            "materialize statements",
            vec![statement_row("s1", "one", "src1")],
        ));
        let retriever = retriever_with(
            graph,
            vec![
                Arc::new(FailingRetriever),
                Arc::new(FixedRetriever {
                    name: "b",
                    hits: vec![("s1".to_string(), 0.5)],
                }),
            ],
            vec![],
            FilterConfig::default(),
        );

        let hits = retriever.retrieve(&SearchQuery::new("q")).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn unmaterializable_hits_are_dropped() {
        let graph = Arc::new(StubGraphStore::new().with_rows(
            "materialize statements",
            vec![statement_row("s1", "one", "src1")],
        ));
        let retriever = retriever_with(
            graph,
            vec![Arc::new(FixedRetriever {
                name: "a",
                hits: vec![("s1".to_string(), 0.9), ("ghost".to_string(), 0.8)],
            })],
            vec![],
            FilterConfig::default(),
        );

        let hits = retriever.retrieve(&SearchQuery::new("q")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].statement_id, "s1");
    }

    #[tokio::test]
    async fn metadata_filter_drops_non_matching_sources() {
        let graph = Arc::new(StubGraphStore::new().with_rows(
            "materialize statements",
            vec![statement_row("s1", "one", "src1")],
        ));
        let retriever = retriever_with(
            graph,
            vec![Arc::new(FixedRetriever {
                name: "a",
                hits: vec![("s1".to_string(), 0.9)],
            })],
            vec![],
            FilterConfig::new(MetadataFilter::Eq {
                key: "lang".to_string(),
                value: "de".to_string(),
            }),
        );

        let hits = retriever.retrieve(&SearchQuery::new("q")).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn hits_are_grouped_by_source_and_sorted_within_groups() {
        let graph = Arc::new(StubGraphStore::new().with_rows(
            "materialize statements",
            vec![
                statement_row("s1", "one", "src-a"),
                statement_row("s2", "two", "src-b"),
                statement_row("s3", "three", "src-a"),
            ],
        ));
        let retriever = retriever_with(
            graph,
            vec![Arc::new(FixedRetriever {
                name: "a",
                hits: vec![
                    ("s1".to_string(), 0.2),
                    ("s2".to_string(), 0.9),
                    ("s3".to_string(), 0.7),
                ],
            })],
            vec![],
            FilterConfig::default(),
        );

        let hits = retriever.retrieve(&SearchQuery::new("q")).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.statement_id.as_str()).collect();
        // src-a was seen first, so its statements lead, best first.
        assert_eq!(ids, vec!["s3", "s1", "s2"]);
    }

    #[tokio::test]
    async fn no_initial_retrievers_is_a_construction_error() {
        let result = SemanticGuidedRetriever::new(
            Arc::new(StubGraphStore::new()),
            vec![],
            vec![],
            RetrievalConfig::default(),
            FilterConfig::default(),
        );
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn hits_to_collection_groups_by_source_and_topic() {
        let mut hit1 = StatementHit::new("s1", 0.9, SearchType::CosineSimilarity);
        hit1.statement = Some(Statement {
            statement_id: Some("s1".to_string()),
            value: "one".to_string(),
            ..Default::default()
        });
        hit1.topic = Some(Topic {
            value: "Invoicing".to_string(),
            ..Default::default()
        });
        hit1.source = Some(Source {
            source_id: "src1".to_string(),
            ..Default::default()
        });
        let mut hit2 = hit1.clone();
        hit2.statement_id = "s2".to_string();
        hit2.score = 0.4;
        if let Some(s) = hit2.statement.as_mut() {
            s.statement_id = Some("s2".to_string());
            s.value = "two".to_string();
        }

        let collection = hits_to_collection(vec![hit1, hit2]);
        assert_eq!(collection.results.len(), 1);
        assert_eq!(collection.results[0].topics.len(), 1);
        assert_eq!(collection.results[0].topics[0].statements.len(), 2);
        assert_eq!(collection.results[0].score, Some(0.9));
    }
}
