//! Statement search ranked by keyword matches.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use lexigraph_core::config::RetrievalConfig;
use lexigraph_core::model::SearchQuery;
use lexigraph_core::store::graph::{run_query, GraphStore};

use crate::cache::SharedEmbeddingCache;
use crate::error::RetrievalResult;
use crate::query::KeywordExtractor;
use crate::utils::statements::get_top_k;

use super::hit::{SearchType, StatementHit};
use super::SemanticRetriever;

const DEFAULT_TOP_K: usize = 100;

/// Finds statements supported by entities whose value matches a query
/// keyword, ranked by how many distinct keywords each statement matched.
///
/// Within a group of statements matching the same number of keywords,
/// cosine similarity to the query breaks ties. The combined score is
/// `(matches / |keywords|) * (cosine + 1) / 2`, so keyword coverage
/// dominates and similarity refines.
pub struct KeywordRankingSearch {
    graph_store: Arc<dyn GraphStore>,
    keyword_extractor: Arc<dyn KeywordExtractor>,
    embedding_cache: Arc<SharedEmbeddingCache>,
    config: RetrievalConfig,
    top_k: usize,
}

impl KeywordRankingSearch {
    pub fn new(
        graph_store: Arc<dyn GraphStore>,
        keyword_extractor: Arc<dyn KeywordExtractor>,
        embedding_cache: Arc<SharedEmbeddingCache>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            graph_store,
            keyword_extractor,
            embedding_cache,
            config,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    async fn match_statements(
        &self,
        keywords: &[String],
    ) -> RetrievalResult<Vec<(String, usize)>> {
        let statement_id = self.graph_store.node_id("statement.statementId");
        let query = format!(
            r#"
        // keyword ranking search
        UNWIND $keywords AS keyword
        MATCH (entity:`__Entity__`)
        WHERE toLower(entity.value) = toLower(keyword)
        WITH entity, keyword
        MATCH (entity)-[:`__SUBJECT__`|`__OBJECT__`]->(:`__Fact__`)-[:`__SUPPORTS__`]->(statement:`__Statement__`)
        WITH statement, collect(DISTINCT keyword) AS matchedKeywords
        RETURN {{
            statement: {{ statementId: {statement_id} }},
            matchedKeywords: matchedKeywords
        }} AS result"#
        );

        let rows = run_query(
            &*self.graph_store,
            &query,
            json!({ "keywords": keywords }),
            &self.config.retry,
        )
        .await?;

        let mut matches = Vec::new();
        for row in rows {
            let Some(id) = row
                .pointer("/result/statement/statementId")
                .and_then(|v| v.as_str())
            else {
                continue;
            };
            let matched = row
                .pointer("/result/matchedKeywords")
                .and_then(|v| v.as_array())
                .map(|kw| kw.len())
                .unwrap_or(0);
            if matched > 0 {
                matches.push((id.to_string(), matched));
            }
        }
        Ok(matches)
    }
}

#[async_trait]
impl SemanticRetriever for KeywordRankingSearch {
    fn name(&self) -> &'static str {
        "KeywordRankingSearch"
    }

    async fn retrieve_hits(&self, query: &SearchQuery) -> RetrievalResult<Vec<StatementHit>> {
        let keywords = self.keyword_extractor.get_keywords(query).await;
        if keywords.is_empty() {
            warn!("no keywords extracted from query");
            return Ok(Vec::new());
        }

        let matches = self.match_statements(&keywords).await?;
        if matches.is_empty() {
            debug!("no statements matched the query keywords");
            return Ok(Vec::new());
        }

        // Group statements by distinct-keyword match count.
        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (statement_id, matched) in matches {
            groups.entry(matched).or_default().push(statement_id);
        }

        let keyword_count = keywords.len() as f64;
        let query_embedding: &[f32] = query.embedding.as_deref().unwrap_or(&[]);

        let mut hits: Vec<StatementHit> = Vec::new();
        for (matched, group) in groups.into_iter().rev() {
            let coverage = matched as f64 / keyword_count;
            if group.len() == 1 {
                hits.push(StatementHit::new(
                    group.into_iter().next().unwrap_or_default(),
                    coverage,
                    SearchType::KeywordRanking,
                ));
                continue;
            }

            // Ties within a group break on similarity to the query.
            let embeddings = self.embedding_cache.get_embeddings(&group).await;
            let scored = get_top_k(query_embedding, &embeddings, group.len());
            let scored_ids: HashSet<&str> = scored.iter().map(|(_, id)| id.as_str()).collect();
            for (cosine, statement_id) in &scored {
                let score = coverage * (f64::from(*cosine) + 1.0) / 2.0;
                hits.push(StatementHit::new(
                    statement_id.clone(),
                    score,
                    SearchType::KeywordRanking,
                ));
            }
            // Statements without a stored embedding keep the coverage score.
            for statement_id in group {
                if !scored_ids.contains(statement_id.as_str()) {
                    warn!(statement_id = %statement_id, "no embedding for keyword match, keeping coverage score");
                    hits.push(StatementHit::new(
                        statement_id,
                        coverage / 2.0,
                        SearchType::KeywordRanking,
                    ));
                }
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.statement_id.cmp(&b.statement_id))
        });
        hits.truncate(self.top_k);

        debug!(count = hits.len(), "keyword ranking hits");
        Ok(hits)
    }
}
