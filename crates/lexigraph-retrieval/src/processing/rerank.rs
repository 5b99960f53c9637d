//! Statement reranking.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use tracing::{debug, error};

use lexigraph_core::config::{RerankerStrategy, RetrievalConfig};
use lexigraph_core::error::{CoreError, CoreResult};
use lexigraph_core::model::{ScoredEntity, SearchQuery, SearchResultCollection, SourceInfo};
use lexigraph_core::store::Reranker;

use crate::utils::tfidf::{score_values, token_windows};

use super::{retain_results, retain_topics, Processor};

/// Query token-window size for the n-gram strategy.
const MATCH_WINDOW_SIZE: usize = 25;
const MATCH_WINDOW_OVERLAP: usize = 5;

/// Render one metadata value for the reranking context: dates become
/// readable, URLs are dropped, everything else passes through.
fn format_metadata_value(value: &str) -> Option<String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.format("%B %-d, %Y").to_string());
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.format("%B %-d, %Y").to_string());
    }
    if value.starts_with("http") {
        return None;
    }
    Some(value.to_string())
}

fn reranking_source_str(source: &SourceInfo) -> String {
    match source {
        SourceInfo::Label(label) => label.clone(),
        SourceInfo::Source(source) => source
            .metadata
            .values()
            .filter_map(|v| format_metadata_value(v))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// The string a statement is scored under: topic and source metadata
/// give the model document context around the statement text.
fn statement_context(source_str: &str, topic_str: &str, statement_str: &str) -> String {
    format!("{topic_str}: {statement_str}; {source_str}")
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Reranks statements within each topic by relevance to the query.
///
/// Two interchangeable strategies: a cross-encoder reranker model, or a
/// model-free TF-IDF n-gram overlap against query token windows plus
/// entity-context terms. Statements whose context string is absent from
/// the scored map are dropped rather than retained with a stale score,
/// which defends against reranker truncation.
pub struct RerankStatements {
    strategy: RerankerStrategy,
    max_statements: usize,
    ec_max_contexts: usize,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RerankStatements {
    /// Fails eagerly when the model strategy is configured without a
    /// reranker backend.
    pub fn new(config: &RetrievalConfig, reranker: Option<Arc<dyn Reranker>>) -> CoreResult<Self> {
        if config.reranker == RerankerStrategy::Model && reranker.is_none() {
            return Err(CoreError::MissingCapability {
                component: "RerankStatements".to_string(),
                capability: "reranker model".to_string(),
            });
        }
        Ok(Self {
            strategy: config.reranker,
            max_statements: config.max_statements,
            ec_max_contexts: config.entity_context.max_contexts,
            reranker,
        })
    }

    fn tfidf_scores(
        &self,
        values: &[String],
        query: &SearchQuery,
        entity_contexts: &[Vec<ScoredEntity>],
    ) -> HashMap<String, f64> {
        let mut match_values = token_windows(
            &query.text.to_lowercase(),
            MATCH_WINDOW_SIZE,
            MATCH_WINDOW_OVERLAP,
        );

        let extras: Vec<String> = entity_contexts
            .iter()
            .take(self.ec_max_contexts)
            .map(|context| {
                context
                    .iter()
                    .map(|e| e.entity.value.to_lowercase())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect();

        // Entity-context rows take precedence over identical query windows.
        match_values.retain(|m| !extras.contains(m));
        let num_primary = if extras.is_empty() {
            match_values.len()
        } else {
            // The leading context row counts as a primary match term.
            match_values.len() + (self.ec_max_contexts / 2).min(1)
        };
        match_values.extend(extras);

        debug!(
            match_values = match_values.len(),
            num_primary, "scoring statements with tfidf"
        );

        score_values(
            values,
            &match_values,
            Some(self.max_statements),
            Some(num_primary),
        )
        .into_iter()
        .collect()
    }

    async fn model_scores(
        &self,
        values: &[String],
        query: &SearchQuery,
        entity_contexts: &[Vec<ScoredEntity>],
    ) -> CoreResult<HashMap<String, f64>> {
        let reranker = self.reranker.as_ref().ok_or_else(|| {
            CoreError::MissingCapability {
                component: "RerankStatements".to_string(),
                capability: "reranker model".to_string(),
            }
        })?;

        let extras = entity_contexts
            .iter()
            .take(self.ec_max_contexts)
            .flat_map(|context| context.iter().map(|e| e.entity.value.to_lowercase()))
            .collect::<Vec<_>>()
            .join(", ");
        let rank_query = if extras.is_empty() {
            query.text.clone()
        } else {
            format!("{} (keywords: {})", query.text, extras)
        };
        debug!(query = %rank_query, "scoring statements with reranker model");

        let pairs: Vec<(String, String)> = values
            .iter()
            .map(|value| (rank_query.clone(), value.clone()))
            .collect();
        let scores = reranker.rerank_pairs(&pairs, reranker.batch_size()).await?;

        let mut scored: Vec<(String, f64)> = values
            .iter()
            .cloned()
            .zip(scores.into_iter().map(f64::from))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(self.max_statements);
        Ok(scored.into_iter().collect())
    }
}

#[async_trait]
impl Processor for RerankStatements {
    fn name(&self) -> &'static str {
        "RerankStatements"
    }

    async fn process(
        &self,
        collection: SearchResultCollection,
        query: &SearchQuery,
    ) -> SearchResultCollection {
        if self.strategy == RerankerStrategy::None {
            return collection;
        }

        let mut values: Vec<String> = Vec::new();
        for result in &collection.results {
            let source_str = reranking_source_str(&result.source);
            for topic in &result.topics {
                for statement in &topic.statements {
                    let statement_str = statement
                        .statement_str
                        .as_deref()
                        .unwrap_or(&statement.value);
                    values.push(statement_context(&source_str, &topic.value, statement_str));
                }
            }
        }
        if values.is_empty() {
            return collection;
        }

        let scored = match self.strategy {
            RerankerStrategy::Tfidf => {
                self.tfidf_scores(&values, query, &collection.entity_contexts)
            }
            RerankerStrategy::Model => {
                match self
                    .model_scores(&values, query, &collection.entity_contexts)
                    .await
                {
                    Ok(scored) => scored,
                    Err(e) => {
                        error!(error = %e, "statement reranking failed, keeping retrieval scores");
                        return collection;
                    }
                }
            }
            RerankerStrategy::None => unreachable!("handled above"),
        };

        retain_results(collection, |_, result| {
            let source_str = reranking_source_str(&result.source);
            Some(retain_topics(result, |mut topic| {
                let topic_str = topic.value.clone();
                topic.statements.retain_mut(|statement| {
                    let statement_str = statement
                        .statement_str
                        .as_deref()
                        .unwrap_or(&statement.value);
                    let key = statement_context(&source_str, &topic_str, statement_str);
                    match scored.get(&key) {
                        Some(score) => {
                            statement.score = round4(*score);
                            true
                        }
                        None => false,
                    }
                });
                topic
                    .statements
                    .sort_by(|a, b| b.score.total_cmp(&a.score));
                Some(topic)
            }))
        })
    }
}
