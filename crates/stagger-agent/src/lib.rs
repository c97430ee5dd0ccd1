//! `stagger-agent`: turns free-form instructions into email bodies.
//!
//! [`composer::EmailComposer`] wraps any [`provider::LlmProvider`] and is the
//! [`composer::ContentGenerator`] the scheduler calls once per job.

pub mod composer;
pub mod openai;
pub mod provider;

pub use composer::{ContentGenerator, EmailComposer, GenerationError};
pub use openai::OpenAiProvider;
pub use provider::{ChatRequest, ChatResponse, FinishReason, LlmProvider, ProviderError};
