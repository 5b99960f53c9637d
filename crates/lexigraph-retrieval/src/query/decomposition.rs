//! Query decomposition into subqueries.

use std::sync::Arc;

use tracing::{debug, warn};

use lexigraph_core::model::SearchQuery;
use lexigraph_core::store::{Llm, PromptTemplate};

use crate::prompts::{EXTRACT_SUBQUERIES_PROMPT, IDENTIFY_MULTIPART_QUESTION_PROMPT};

/// Queries at or below this many words are never decomposed.
const SINGLE_QUESTION_THRESHOLD: usize = 25;

/// Splits a multipart query into independent subqueries.
///
/// Short queries pass through untouched; longer ones are first classified
/// as single or multipart, and only multipart queries are split. Any
/// model failure falls back to the original query.
pub struct QueryDecomposer {
    llm: Arc<dyn Llm>,
    max_subqueries: usize,
    identify_template: PromptTemplate,
    extract_template: PromptTemplate,
}

impl QueryDecomposer {
    pub fn new(llm: Arc<dyn Llm>, max_subqueries: usize) -> Self {
        Self {
            llm,
            max_subqueries,
            identify_template: PromptTemplate::new(IDENTIFY_MULTIPART_QUESTION_PROMPT),
            extract_template: PromptTemplate::new(EXTRACT_SUBQUERIES_PROMPT),
        }
    }

    /// Decompose a query into one or more subqueries.
    pub async fn decompose(&self, query: &SearchQuery) -> Vec<SearchQuery> {
        if query.text.split_whitespace().count() <= SINGLE_QUESTION_THRESHOLD {
            return vec![query.clone()];
        }

        match self.try_decompose(query).await {
            Ok(subqueries) => subqueries,
            Err(e) => {
                warn!(error = %e, "query decomposition failed, keeping original query");
                vec![query.clone()]
            }
        }
    }

    async fn try_decompose(
        &self,
        query: &SearchQuery,
    ) -> lexigraph_core::error::CoreResult<Vec<SearchQuery>> {
        let response = self
            .llm
            .predict(&self.identify_template, &[("question", &query.text)])
            .await?;

        if !response.trim().to_lowercase().starts_with("no") {
            return Ok(vec![query.clone()]);
        }

        let response = self
            .llm
            .predict(
                &self.extract_template,
                &[
                    ("question", &query.text),
                    ("max_subqueries", &self.max_subqueries.to_string()),
                ],
            )
            .await?;

        let subqueries: Vec<SearchQuery> = response
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(self.max_subqueries)
            .map(SearchQuery::new)
            .collect();

        debug!(count = subqueries.len(), "subqueries extracted");

        if subqueries.is_empty() {
            Ok(vec![query.clone()])
        } else {
            Ok(subqueries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexigraph_core::stubs::StubLlm;

    const LONG_MULTIPART: &str = "who reviewed invoice 42 in the first quarter of the year \
        and which department approved the corresponding purchase order and what was the total \
        amount paid out to the supplier in the end";

    #[tokio::test]
    async fn short_queries_pass_through_without_model_calls() {
        let llm = Arc::new(StubLlm::failing());
        let decomposer = QueryDecomposer::new(llm, 2);
        let subqueries = decomposer.decompose(&SearchQuery::new("who reviewed invoice 42")).await;
        assert_eq!(subqueries.len(), 1);
        assert_eq!(subqueries[0].text, "who reviewed invoice 42");
    }

    #[tokio::test]
    async fn multipart_queries_are_split_and_capped() {
        let llm = Arc::new(
            StubLlm::new()
                .with_response("single question", "no")
                .with_response("standalone questions", "who reviewed invoice 42?\nwhich department approved the purchase order?\nwhat was the total amount?"),
        );
        let decomposer = QueryDecomposer::new(llm, 2);
        let subqueries = decomposer.decompose(&SearchQuery::new(LONG_MULTIPART)).await;
        assert_eq!(subqueries.len(), 2);
        assert_eq!(subqueries[0].text, "who reviewed invoice 42?");
    }

    #[tokio::test]
    async fn single_long_queries_are_not_split() {
        let llm = Arc::new(StubLlm::new().with_response("single question", "yes"));
        let decomposer = QueryDecomposer::new(llm, 2);
        let subqueries = decomposer.decompose(&SearchQuery::new(LONG_MULTIPART)).await;
        assert_eq!(subqueries.len(), 1);
    }

    #[tokio::test]
    async fn model_failure_keeps_the_original_query() {
        let llm = Arc::new(StubLlm::failing());
        let decomposer = QueryDecomposer::new(llm, 2);
        let subqueries = decomposer.decompose(&SearchQuery::new(LONG_MULTIPART)).await;
        assert_eq!(subqueries.len(), 1);
        assert_eq!(subqueries[0].text, LONG_MULTIPART);
    }
}
