//! LLM completion providers.
//!
//! The intent classifier's LLM tier needs exactly one thing from a provider:
//! a short text completion for a short prompt. [`CompletionModel`] captures
//! that, and [`select::select_model`] picks the cheapest configured provider.

pub mod anthropic;
pub mod openai_compat;
pub mod select;

use async_trait::async_trait;
use switchyard_core::ProviderError;

pub use anthropic::AnthropicModel;
pub use openai_compat::OpenAiCompatModel;
pub use select::{select_model, SelectedModel};

/// A minimal text-in / text-out completion backend.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Provider name (e.g. "anthropic", "ollama").
    fn name(&self) -> &str;

    /// Complete a prompt and return the raw text response.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}
