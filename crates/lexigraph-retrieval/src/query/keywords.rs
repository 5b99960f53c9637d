//! Keyword extraction from a query string.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use lexigraph_core::model::SearchQuery;
use lexigraph_core::store::{Llm, PromptTemplate};

use crate::prompts::{EXTENDED_EXTRACT_KEYWORDS_PROMPT, SIMPLE_EXTRACT_KEYWORDS_PROMPT};

/// Derives candidate keywords and entity mentions from a query.
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    /// Extract keywords. Failure is not an option: extractors degrade to
    /// an empty set, which callers treat as "no information available".
    async fn get_keywords(&self, query: &SearchQuery) -> Vec<String>;
}

/// LLM-backed extraction running two strategies concurrently: a direct
/// keyword ask and an extended ask for variants/related terms. Outputs are
/// unioned with case-insensitive deduplication.
pub struct LlmKeywordExtractor {
    llm: Arc<dyn Llm>,
    max_keywords: usize,
    simple_template: PromptTemplate,
    extended_template: PromptTemplate,
}

impl LlmKeywordExtractor {
    pub fn new(llm: Arc<dyn Llm>, max_keywords: usize) -> Self {
        Self {
            llm,
            max_keywords,
            simple_template: PromptTemplate::new(SIMPLE_EXTRACT_KEYWORDS_PROMPT),
            extended_template: PromptTemplate::new(EXTENDED_EXTRACT_KEYWORDS_PROMPT),
        }
    }

    /// Override the extended-strategy prompt (e.g. with the synonyms ask).
    pub fn with_extended_template(mut self, template: PromptTemplate) -> Self {
        self.extended_template = template;
        self
    }

    async fn extract(&self, template: &PromptTemplate, text: &str, count: usize) -> Vec<String> {
        match self
            .llm
            .predict(
                template,
                &[("text", text), ("max_keywords", &count.to_string())],
            )
            .await
        {
            Ok(response) => response
                .split('^')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            Err(e) => {
                error!(error = %e, "keyword extraction strategy failed");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl KeywordExtractor for LlmKeywordExtractor {
    async fn get_keywords(&self, query: &SearchQuery) -> Vec<String> {
        let per_strategy = (self.max_keywords / 2).max(1);

        let (simple, extended) = tokio::join!(
            self.extract(&self.simple_template, &query.text, per_strategy),
            self.extract(&self.extended_template, &query.text, per_strategy),
        );

        let mut seen: HashSet<String> = HashSet::new();
        let mut keywords: Vec<String> = Vec::new();
        for keyword in simple.into_iter().chain(extended) {
            if seen.insert(keyword.to_lowercase()) {
                keywords.push(keyword);
            }
        }
        keywords.truncate(self.max_keywords);

        debug!(keywords = ?keywords, "extracted keywords");
        keywords
    }
}

/// Uses the query string itself as the single keyword.
#[derive(Default)]
pub struct PassThruKeywordExtractor;

#[async_trait]
impl KeywordExtractor for PassThruKeywordExtractor {
    async fn get_keywords(&self, query: &SearchQuery) -> Vec<String> {
        vec![query.text.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexigraph_core::stubs::StubLlm;

    #[tokio::test]
    async fn strategies_are_unioned_case_insensitively() {
        let llm = Arc::new(
            StubLlm::new()
                .with_response("text below. Respond", "Invoice 42^Alice")
                .with_response("alternative spellings", "invoice 42^employees"),
        );
        let extractor = LlmKeywordExtractor::new(llm, 10);
        let keywords = extractor
            .get_keywords(&SearchQuery::new("who reviewed invoice 42?"))
            .await;
        assert_eq!(keywords, vec!["Invoice 42", "Alice", "employees"]);
    }

    #[tokio::test]
    async fn one_failing_strategy_does_not_abort_the_other() {
        // Only the simple prompt has a canned answer; the extended call errors.
        let llm = Arc::new(StubLlm::new().with_response("text below. Respond", "alpha^beta"));
        let extractor = LlmKeywordExtractor::new(llm, 10);
        let keywords = extractor.get_keywords(&SearchQuery::new("q")).await;
        assert_eq!(keywords, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn total_failure_degrades_to_empty() {
        let extractor = LlmKeywordExtractor::new(Arc::new(StubLlm::failing()), 10);
        let keywords = extractor.get_keywords(&SearchQuery::new("q")).await;
        assert!(keywords.is_empty());
    }

    #[tokio::test]
    async fn max_keywords_caps_the_union() {
        let llm = Arc::new(
            StubLlm::new()
                .with_response("text below. Respond", "a^b^c")
                .with_response("alternative spellings", "d^e^f"),
        );
        let extractor = LlmKeywordExtractor::new(llm, 4);
        let keywords = extractor.get_keywords(&SearchQuery::new("q")).await;
        assert_eq!(keywords.len(), 4);
    }

    #[tokio::test]
    async fn pass_thru_returns_the_query() {
        let extractor = PassThruKeywordExtractor;
        let keywords = extractor.get_keywords(&SearchQuery::new("invoice 42")).await;
        assert_eq!(keywords, vec!["invoice 42"]);
    }
}
