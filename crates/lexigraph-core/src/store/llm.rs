//! Language-model abstraction and prompt templates.

use async_trait::async_trait;

use crate::error::{CoreError, CoreResult};

/// A prompt with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The raw template text.
    pub fn text(&self) -> &str {
        &self.template
    }

    /// Substitute placeholders. Unknown placeholders are an error so a
    /// misspelled variable fails loudly instead of reaching the model.
    pub fn render(&self, vars: &[(&str, &str)]) -> CoreResult<String> {
        let mut rendered = self.template.clone();
        for (name, value) in vars {
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }
        if let Some(start) = rendered.find('{') {
            if rendered[start..].contains('}') {
                return Err(CoreError::Validation {
                    field: "prompt".to_string(),
                    message: format!(
                        "unsubstituted placeholder in prompt: {}",
                        &rendered[start..rendered.len().min(start + 40)]
                    ),
                });
            }
        }
        Ok(rendered)
    }
}

/// A text-completion model.
#[async_trait]
pub trait Llm: Send + Sync {
    /// Render the template with the given variables and predict a completion.
    async fn predict(&self, template: &PromptTemplate, vars: &[(&str, &str)])
        -> CoreResult<String>;
}
