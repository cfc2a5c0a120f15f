//! LLM-backed [`TranslationService`].
//!
//! Thin on purpose: prompt wording lives in [`crate::prompts`], retrying in
//! [`super::retry`], cleanup in [`super::postprocess`]. One call here is one
//! attempt; failures are classified into a [`ServiceError`] and handed back.

use crate::config::TranslationConfig;
use crate::error::ServiceError;
use crate::pipeline::postprocess::clean_translation;
use crate::prompts::translation_prompt;
use crate::traits::TranslationService;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Translates chunk text through an `edgequake-llm` provider.
pub struct LlmTranslator {
    provider: Arc<dyn LLMProvider>,
    label: String,
    system_prompt: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl LlmTranslator {
    /// `label` names the provider in logs and snapshots, e.g. `"gemini/gemini-2.0-flash"`.
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, config: &TranslationConfig) -> Self {
        let system_prompt = config.system_prompt.clone().unwrap_or_else(|| {
            translation_prompt(&config.source_language, &config.target_language)
        });
        Self {
            provider,
            label: label.into(),
            system_prompt,
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn messages(&self, text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(text),
        ]
    }
}

#[async_trait]
impl TranslationService for LlmTranslator {
    fn name(&self) -> &str {
        &self.label
    }

    async fn translate(&self, text: &str) -> Result<String, ServiceError> {
        let start = Instant::now();
        let messages = self.messages(text);

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&self.options)))
            .await
            .map_err(|_| ServiceError::Failed {
                message: format!("Translation request timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| ServiceError::from_message(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(ServiceError::Failed {
                message: "Model returned an empty translation".to_string(),
            });
        }
        Ok(clean_translation(&response.content))
    }
}

/// Build `CompletionOptions` from the translation config.
fn build_options(config: &TranslationConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
