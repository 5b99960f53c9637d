//! Beam search over the statement graph.
//!
//! Both variants explore statement adjacency (statements supported by a
//! shared entity) breadth-first with a bounded beam: a max-heap keyed by
//! descending score pops the best unvisited candidate, which is emitted
//! as a result and, while its depth allows, expanded into scored
//! neighbours. The search stops when the heap empties or `beam_width`
//! results have been emitted; depth only gates expansion, never emission.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use lexigraph_core::config::RetrievalConfig;
use lexigraph_core::metadata::FilterConfig;
use lexigraph_core::model::SearchQuery;
use lexigraph_core::store::{GraphStore, Reranker, VectorStore};

use crate::cache::{SharedEmbeddingCache, SharedNeighbourCache};
use crate::error::{RetrievalError, RetrievalResult};
use crate::utils::statements::{get_statements, get_top_k, StatementRow};

use super::hit::{SearchType, StatementHit};
use super::{BeamRetriever, SemanticRetriever};

const STATEMENT_INDEX: &str = "statement";

/// One frontier entry. Ordered by descending score so a [`BinaryHeap`]
/// pops the best candidate first; ties break on id for determinism.
#[derive(Debug, Clone)]
struct BeamCandidate {
    score: f64,
    depth: usize,
    statement_id: String,
    path: Vec<String>,
}

impl PartialEq for BeamCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BeamCandidate {}

impl PartialOrd for BeamCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BeamCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.statement_id.cmp(&self.statement_id))
    }
}

/// Seed statement ids for a beam search: the shared hits when present,
/// otherwise a vector-similarity fallback over the statement index.
async fn seed_statement_ids(
    shared_hits: &[StatementHit],
    vector_store: &dyn VectorStore,
    query: &SearchQuery,
    beam_width: usize,
    filter_config: &FilterConfig,
) -> RetrievalResult<Vec<String>> {
    if !shared_hits.is_empty() {
        let mut seen = HashSet::new();
        return Ok(shared_hits
            .iter()
            .map(|hit| hit.statement_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect());
    }

    let index = vector_store.get_index(STATEMENT_INDEX)?;
    let rows = index
        .top_k(query, beam_width * 2, Some(filter_config))
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.pointer("/statement/statementId"))
        .filter_map(|id| id.as_str())
        .map(str::to_string)
        .collect())
}

/// Beam search guided by cosine similarity of cached statement
/// embeddings.
///
/// Emits hits with zero scores: the pipeline downstream reranks them, so
/// only the traversal order and paths matter here.
pub struct SemanticBeamSearch {
    vector_store: Arc<dyn VectorStore>,
    embedding_cache: Arc<SharedEmbeddingCache>,
    neighbour_cache: Arc<SharedNeighbourCache>,
    config: RetrievalConfig,
    filter_config: FilterConfig,
}

impl SemanticBeamSearch {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedding_cache: Arc<SharedEmbeddingCache>,
        neighbour_cache: Arc<SharedNeighbourCache>,
        config: RetrievalConfig,
        filter_config: FilterConfig,
    ) -> Self {
        Self {
            vector_store,
            embedding_cache,
            neighbour_cache,
            config,
            filter_config,
        }
    }

    async fn beam_search(
        &self,
        query_embedding: &[f32],
        start_statement_ids: &[String],
    ) -> RetrievalResult<Vec<(String, Vec<String>)>> {
        let beam_width = self.config.beam.beam_width;
        let max_depth = self.config.beam.max_depth;

        let mut visited: HashSet<String> = HashSet::new();
        let mut results: Vec<(String, Vec<String>)> = Vec::new();
        let mut queue: BinaryHeap<BeamCandidate> = BinaryHeap::new();

        let start_embeddings = self.embedding_cache.get_embeddings(start_statement_ids).await;
        if start_embeddings.len() < start_statement_ids.len() {
            warn!(
                missing = start_statement_ids.len() - start_embeddings.len(),
                "seed statements without embeddings are skipped"
            );
        }
        for (score, statement_id) in
            get_top_k(query_embedding, &start_embeddings, start_statement_ids.len())
        {
            queue.push(BeamCandidate {
                score: score as f64,
                depth: 0,
                statement_id: statement_id.clone(),
                path: vec![statement_id],
            });
        }

        while results.len() < beam_width {
            let Some(candidate) = queue.pop() else {
                break;
            };
            if !visited.insert(candidate.statement_id.clone()) {
                continue;
            }
            results.push((candidate.statement_id.clone(), candidate.path.clone()));

            if candidate.depth >= max_depth {
                continue;
            }
            let neighbours = self
                .neighbour_cache
                .get_neighbours(&candidate.statement_id)
                .await?;
            if neighbours.is_empty() {
                continue;
            }

            let neighbour_embeddings = self.embedding_cache.get_embeddings(&neighbours).await;
            for (score, neighbour_id) in
                get_top_k(query_embedding, &neighbour_embeddings, beam_width)
            {
                if visited.contains(&neighbour_id) {
                    continue;
                }
                let mut path = candidate.path.clone();
                path.push(neighbour_id.clone());
                queue.push(BeamCandidate {
                    score: score as f64,
                    depth: candidate.depth + 1,
                    statement_id: neighbour_id,
                    path,
                });
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl BeamRetriever for SemanticBeamSearch {
    fn name(&self) -> &'static str {
        "SemanticBeamSearch"
    }

    async fn expand(
        &self,
        query: &SearchQuery,
        shared_hits: &[StatementHit],
    ) -> RetrievalResult<Vec<StatementHit>> {
        let query_embedding =
            query
                .embedding
                .as_deref()
                .ok_or(RetrievalError::MissingQueryEmbedding {
                    operation: "semantic beam search",
                })?;

        let initial_statement_ids = seed_statement_ids(
            shared_hits,
            &*self.vector_store,
            query,
            self.config.beam.beam_width,
            &self.filter_config,
        )
        .await?;
        debug!(seeds = initial_statement_ids.len(), "beam search seeds");
        if initial_statement_ids.is_empty() {
            return Ok(Vec::new());
        }

        let beam_results = self
            .beam_search(query_embedding, &initial_statement_ids)
            .await?;
        debug!(count = beam_results.len(), "beam search results");

        let seeds: HashSet<&str> = initial_statement_ids.iter().map(String::as_str).collect();
        Ok(beam_results
            .into_iter()
            .filter(|(statement_id, _)| !seeds.contains(statement_id.as_str()))
            .map(|(statement_id, path)| {
                let mut hit = StatementHit::new(statement_id, 0.0, SearchType::BeamSearch);
                hit.path = path;
                hit
            })
            .collect())
    }
}

/// Beam search guided by a pairwise reranker model.
///
/// Scores and materialized statements are cached per instance so a
/// statement revisited through a different path is never rescored or
/// refetched.
pub struct RerankingBeamSearch {
    graph_store: Arc<dyn GraphStore>,
    vector_store: Arc<dyn VectorStore>,
    reranker: Arc<dyn Reranker>,
    neighbour_cache: Arc<SharedNeighbourCache>,
    initial_retrievers: Vec<Arc<dyn SemanticRetriever>>,
    config: RetrievalConfig,
    filter_config: FilterConfig,
    score_cache: Mutex<HashMap<String, f32>>,
    statement_cache: Mutex<HashMap<String, StatementRow>>,
}

impl RerankingBeamSearch {
    pub fn new(
        graph_store: Arc<dyn GraphStore>,
        vector_store: Arc<dyn VectorStore>,
        reranker: Arc<dyn Reranker>,
        neighbour_cache: Arc<SharedNeighbourCache>,
        config: RetrievalConfig,
        filter_config: FilterConfig,
    ) -> Self {
        Self {
            graph_store,
            vector_store,
            reranker,
            neighbour_cache,
            initial_retrievers: Vec::new(),
            config,
            filter_config,
            score_cache: Mutex::new(HashMap::new()),
            statement_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Retrievers consulted for seeds when no shared hits are supplied.
    pub fn with_initial_retrievers(
        mut self,
        initial_retrievers: Vec<Arc<dyn SemanticRetriever>>,
    ) -> Self {
        self.initial_retrievers = initial_retrievers;
        self
    }

    /// Materialized rows for the given ids, fetching cache misses in one
    /// batch. Ids the graph no longer knows are absent from the result.
    async fn statements_for(
        &self,
        statement_ids: &[String],
    ) -> RetrievalResult<HashMap<String, StatementRow>> {
        let uncached: Vec<String> = {
            let cache = self.statement_cache.lock();
            statement_ids
                .iter()
                .filter(|id| !cache.contains_key(*id))
                .cloned()
                .collect()
        };

        if !uncached.is_empty() {
            let rows = get_statements(&*self.graph_store, &self.config.retry, &uncached).await?;
            let mut cache = self.statement_cache.lock();
            for row in rows {
                if let Some(id) = row.statement.statement_id.clone() {
                    cache.insert(id, row);
                }
            }
        }

        let cache = self.statement_cache.lock();
        Ok(statement_ids
            .iter()
            .filter_map(|id| cache.get(id).map(|row| (id.clone(), row.clone())))
            .collect())
    }

    /// Score statements against the query, consulting the score cache
    /// keyed by statement text. Returns `(score, id)` pairs, best first.
    async fn rerank(
        &self,
        query_text: &str,
        statement_ids: &[String],
        statement_texts: &HashMap<String, String>,
    ) -> RetrievalResult<Vec<(f32, String)>> {
        let mut uncached: Vec<String> = Vec::new();
        {
            let cache = self.score_cache.lock();
            for statement_id in statement_ids {
                if let Some(text) = statement_texts.get(statement_id) {
                    if !cache.contains_key(text) && !uncached.contains(text) {
                        uncached.push(text.clone());
                    }
                }
            }
        }

        if !uncached.is_empty() {
            let pairs: Vec<(String, String)> = uncached
                .iter()
                .map(|text| (query_text.to_string(), text.clone()))
                .collect();
            let scores = self
                .reranker
                .rerank_pairs(&pairs, self.reranker.batch_size() * 2)
                .await?;
            let mut cache = self.score_cache.lock();
            for (text, score) in uncached.into_iter().zip(scores) {
                cache.insert(text, score);
            }
        }

        let cache = self.score_cache.lock();
        let mut scored: Vec<(f32, String)> = statement_ids
            .iter()
            .filter_map(|id| {
                statement_texts
                    .get(id)
                    .and_then(|text| cache.get(text))
                    .map(|score| (*score, id.clone()))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(scored)
    }

    async fn beam_search(
        &self,
        query: &SearchQuery,
        start_statement_ids: &[String],
    ) -> RetrievalResult<Vec<(String, Vec<String>)>> {
        let beam_width = self.config.beam.beam_width;
        let max_depth = self.config.beam.max_depth;

        let mut visited: HashSet<String> = HashSet::new();
        let mut results: Vec<(String, Vec<String>)> = Vec::new();
        let mut queue: BinaryHeap<BeamCandidate> = BinaryHeap::new();

        let start_rows = self.statements_for(start_statement_ids).await?;
        let start_texts: HashMap<String, String> = start_rows
            .iter()
            .map(|(id, row)| (id.clone(), row.statement.value.clone()))
            .collect();
        let start_ids: Vec<String> = start_texts.keys().cloned().collect();

        for (score, statement_id) in self.rerank(&query.text, &start_ids, &start_texts).await? {
            queue.push(BeamCandidate {
                score: score as f64,
                depth: 0,
                statement_id: statement_id.clone(),
                path: vec![statement_id],
            });
        }

        while results.len() < beam_width {
            let Some(candidate) = queue.pop() else {
                break;
            };
            if !visited.insert(candidate.statement_id.clone()) {
                continue;
            }
            results.push((candidate.statement_id.clone(), candidate.path.clone()));

            if candidate.depth >= max_depth {
                continue;
            }
            let neighbours = self
                .neighbour_cache
                .get_neighbours(&candidate.statement_id)
                .await?;
            if neighbours.is_empty() {
                continue;
            }

            let neighbour_rows = self.statements_for(&neighbours).await?;
            let neighbour_texts: HashMap<String, String> = neighbour_rows
                .iter()
                .map(|(id, row)| {
                    let mut text = row.statement.value.clone();
                    if !row.statement.details.is_empty() {
                        text.push('\n');
                        text.push_str(&row.statement.details.join("\n"));
                    }
                    (id.clone(), text)
                })
                .collect();
            let neighbour_ids: Vec<String> = neighbour_texts.keys().cloned().collect();

            let scored = self
                .rerank(&query.text, &neighbour_ids, &neighbour_texts)
                .await?;
            for (score, neighbour_id) in scored.into_iter().take(beam_width) {
                if visited.contains(&neighbour_id) {
                    continue;
                }
                let mut path = candidate.path.clone();
                path.push(neighbour_id.clone());
                queue.push(BeamCandidate {
                    score: score as f64,
                    depth: candidate.depth + 1,
                    statement_id: neighbour_id,
                    path,
                });
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl BeamRetriever for RerankingBeamSearch {
    fn name(&self) -> &'static str {
        "RerankingBeamSearch"
    }

    async fn expand(
        &self,
        query: &SearchQuery,
        shared_hits: &[StatementHit],
    ) -> RetrievalResult<Vec<StatementHit>> {
        let initial_statement_ids = if shared_hits.is_empty() && !self.initial_retrievers.is_empty()
        {
            let mut seen: HashSet<String> = HashSet::new();
            let mut ids: Vec<String> = Vec::new();
            for retriever in &self.initial_retrievers {
                match retriever.retrieve_hits(query).await {
                    Ok(hits) => {
                        for hit in hits {
                            if seen.insert(hit.statement_id.clone()) {
                                ids.push(hit.statement_id);
                            }
                        }
                    }
                    Err(e) => {
                        error!(retriever = retriever.name(), error = %e, "initial retriever failed, excluding its seeds");
                    }
                }
            }
            ids
        } else {
            seed_statement_ids(
                shared_hits,
                &*self.vector_store,
                query,
                self.config.beam.beam_width,
                &self.filter_config,
            )
            .await?
        };
        debug!(seeds = initial_statement_ids.len(), "beam search seeds");
        if initial_statement_ids.is_empty() {
            warn!("no initial statements for beam search");
            return Ok(Vec::new());
        }

        let beam_results = self.beam_search(query, &initial_statement_ids).await?;

        let seeds: HashSet<&str> = initial_statement_ids.iter().map(String::as_str).collect();
        let statements = self.statement_cache.lock();
        let scores = self.score_cache.lock();

        let mut hits: Vec<StatementHit> = Vec::new();
        for (statement_id, path) in beam_results {
            if seeds.contains(statement_id.as_str()) {
                continue;
            }
            let Some(row) = statements.get(&statement_id) else {
                warn!(statement_id = %statement_id, "statement missing after beam search, skipping");
                continue;
            };
            let score = scores
                .get(&row.statement.value)
                .copied()
                .unwrap_or(0.0) as f64;
            let mut hit = StatementHit::new(statement_id, score, SearchType::BeamSearch);
            hit.path = path;
            hit.statement = Some(row.statement.clone());
            hit.topic = row.topic.clone();
            hit.chunk = row.chunk.clone();
            hit.source = Some(row.source.clone());
            hits.push(hit);
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        debug!(count = hits.len(), "new statements from beam search");
        Ok(hits)
    }
}
