//! Email body generation on top of an [`LlmProvider`].

use async_trait::async_trait;
use stagger_core::config::GeneratorConfig;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, FinishReason, LlmProvider, ProviderError};

const SYSTEM_PROMPT: &str = "You write clear, professional, polite emails. \
You only return the email body without any explanation.";

/// Turns a free-form instruction into a finished email body.
///
/// Called once per job; the result is frozen and reused for every recipient.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{provider} failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("{provider} returned an empty email body")]
    EmptyBody { provider: String },

    /// The body hit `max_tokens`. It would reach every recipient cut short.
    #[error("{provider} stopped at the {max_tokens} token limit, email body is incomplete")]
    Truncated { provider: String, max_tokens: u32 },

    #[error("{provider} stopped early ({reason}), email body is incomplete")]
    Unfinished { provider: String, reason: String },
}

/// [`ContentGenerator`] that asks a chat model to write the email.
pub struct EmailComposer {
    provider: Box<dyn LlmProvider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl EmailComposer {
    pub fn new(provider: Box<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    pub fn from_config(provider: Box<dyn LlmProvider>, config: &GeneratorConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            instruction: format!("Write an email based on these instructions:\n\n{prompt}"),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl ContentGenerator for EmailComposer {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let provider = self.provider.name().to_string();
        let resp = self
            .provider
            .send(&self.request(prompt))
            .await
            .map_err(|source| {
                warn!(provider = %provider, error = %source, "email generation failed");
                GenerationError::Provider {
                    provider: provider.clone(),
                    source,
                }
            })?;

        match resp.finish {
            FinishReason::Stop => {}
            FinishReason::Length => {
                warn!(provider = %provider, max_tokens = self.max_tokens, "email body truncated");
                return Err(GenerationError::Truncated {
                    provider,
                    max_tokens: self.max_tokens,
                });
            }
            FinishReason::Other(reason) => {
                warn!(provider = %provider, reason = %reason, "email body unfinished");
                return Err(GenerationError::Unfinished { provider, reason });
            }
        }

        let body = resp.content.trim();
        if body.is_empty() {
            return Err(GenerationError::EmptyBody { provider });
        }
        debug!(
            provider = %provider,
            model = %resp.model,
            tokens_out = resp.tokens_out,
            "email body generated"
        );
        Ok(body.to_string())
    }
}
