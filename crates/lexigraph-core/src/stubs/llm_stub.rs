//! Canned-response language model.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::store::{Llm, PromptTemplate};

/// A language model answering from canned responses.
///
/// Responses are registered against a marker string; the first marker found
/// in the rendered prompt wins.
#[derive(Default)]
pub struct StubLlm {
    responses: Vec<(String, String)>,
    prompts: Mutex<Vec<String>>,
    failing: bool,
}

impl StubLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// A model whose every call fails, for degradation tests.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    /// Register a canned response for prompts containing `marker`.
    pub fn with_response(mut self, marker: &str, response: &str) -> Self {
        self.responses.push((marker.to_string(), response.to_string()));
        self
    }

    /// Rendered prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Llm for StubLlm {
    async fn predict(
        &self,
        template: &PromptTemplate,
        vars: &[(&str, &str)],
    ) -> CoreResult<String> {
        if self.failing {
            return Err(CoreError::Llm("stub model offline".to_string()));
        }
        let rendered = template.render(vars)?;
        self.prompts.lock().push(rendered.clone());
        for (marker, response) in &self.responses {
            if rendered.contains(marker.as_str()) {
                return Ok(response.clone());
            }
        }
        Err(CoreError::Llm(format!(
            "no canned response for prompt: {}",
            crate::error::preview(&rendered)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn marker_selects_response() {
        let llm = StubLlm::new().with_response("keywords", "alpha^beta");
        let template = PromptTemplate::new("Extract keywords from: {text}");
        let out = llm.predict(&template, &[("text", "x")]).await.unwrap();
        assert_eq!(out, "alpha^beta");
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn unmatched_prompt_is_an_error() {
        let llm = StubLlm::new();
        let template = PromptTemplate::new("something else entirely");
        assert!(llm.predict(&template, &[]).await.is_err());
    }
}
