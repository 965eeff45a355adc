use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::CompletionProvider;

/// Prompt settings for the generator
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub system_prompt: String,
    /// Must contain `{context}` and `{question}`.
    pub prompt_template: String,
    pub max_output_tokens: u32,
    pub fallback: String,
}

/// Produces a short analytical answer grounded in retrieved context.
pub struct ResponseGenerator {
    llm: Arc<dyn CompletionProvider>,
    settings: GeneratorSettings,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn CompletionProvider>, settings: GeneratorSettings) -> Self {
        Self { llm, settings }
    }

    fn build_prompt(&self, context: &str, question: &str) -> String {
        self.settings
            .prompt_template
            .replace("{context}", context)
            .replace("{question}", question)
    }

    /// One completion call; any failure or empty answer returns the fallback.
    pub async fn generate(&self, context: &str, question: &str) -> String {
        let prompt = self.build_prompt(context, question);
        match self
            .llm
            .complete(
                &self.settings.system_prompt,
                &prompt,
                self.settings.max_output_tokens,
            )
            .await
        {
            Ok(text) if !text.trim().is_empty() => {
                debug!("Generated {} chars for '{}'", text.len(), question);
                text.trim().to_string()
            }
            Ok(_) => {
                warn!("Empty completion for '{}'", question);
                self.settings.fallback.clone()
            }
            Err(e) => {
                warn!("Completion failed for '{}': {:#}", question, e);
                self.settings.fallback.clone()
            }
        }
    }
}
