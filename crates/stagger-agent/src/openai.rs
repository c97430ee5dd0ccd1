//! OpenAI-compatible chat completions backend.
//!
//! Each email is one non-streaming completion: the system prompt plus a
//! single user turn. The whole exchange is bounded by the client timeout,
//! since job creation waits on it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stagger_core::config::GeneratorConfig;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, ChatResponse, FinishReason, LlmProvider, ProviderError};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl OpenAiProvider {
    /// `base_url` is the API root, e.g. `https://api.openai.com`.
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}{COMPLETIONS_PATH}", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    /// Build from the `[generator]` section with an already resolved key.
    pub fn from_config(api_key: String, config: &GeneratorConfig) -> Result<Self, ProviderError> {
        Self::new(
            api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: [Turn<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ChatRequest> for CompletionBody<'a> {
    fn from(req: &'a ChatRequest) -> Self {
        Self {
            model: &req.model,
            messages: [
                Turn {
                    role: "system",
                    content: &req.system,
                },
                Turn {
                    role: "user",
                    content: &req.instruction,
                },
            ],
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        }
    }
}

#[derive(Deserialize)]
struct Completion {
    model: String,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ReplyText,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyText {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionUsage {
    completion_tokens: u32,
}

impl TryFrom<Completion> for ChatResponse {
    type Error = ProviderError;

    fn try_from(completion: Completion) -> Result<Self, Self::Error> {
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("completion has no choices".to_string()))?;
        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            model: completion.model,
            tokens_out: completion.usage.map_or(0, |u| u.completion_tokens),
            finish: FinishReason::from_wire(choice.finish_reason.as_deref()),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        debug!(model = %req.model, max_tokens = req.max_tokens, "requesting email completion");

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&CompletionBody::from(req))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %message, "completion request rejected");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: Completion = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                ProviderError::Parse(e.to_string())
            }
        })?;
        completion.try_into()
    }
}

impl OpenAiProvider {
    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                ms: self.timeout.as_millis() as u64,
            }
        } else {
            ProviderError::Http(e)
        }
    }
}
