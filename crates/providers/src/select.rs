//! Provider selection for the intent classifier's LLM tier.
//!
//! Preference order is cost-driven: a local Ollama (free) beats Claude Haiku,
//! which beats Gemini Flash-8B, which beats GPT-4o-mini. An explicit provider
//! (config or `INTENT_LLM_PROVIDER`/`LLM_PROVIDER`) short-circuits detection.
//! Selection never fails the caller: an unconfigurable provider yields `None`
//! and the classifier silently downgrades to deterministic-only.

use crate::{AnthropicModel, CompletionModel, OpenAiCompatModel};
use std::sync::Arc;
use tracing::{debug, info};

const OLLAMA_DEFAULT_MODEL: &str = "llama3.2:3b";
const GOOGLE_DEFAULT_MODEL: &str = "gemini-1.5-flash-8b";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// A chosen provider and its name for classification metadata.
pub struct SelectedModel {
    pub model: Arc<dyn CompletionModel>,
    pub provider: String,
}

/// Pick a completion model from the environment.
///
/// `preferred` forces a single provider; otherwise providers are tried in
/// cost order. Returns `None` when nothing is configured.
pub fn select_model(preferred: Option<&str>) -> Option<SelectedModel> {
    if let Some(provider) = preferred {
        let selected = try_provider(provider);
        if selected.is_none() {
            debug!(provider, "Preferred intent provider not configured");
        }
        return selected;
    }

    for provider in ["ollama", "anthropic", "google", "openai"] {
        if let Some(selected) = try_provider(provider) {
            return Some(selected);
        }
    }
    None
}

fn try_provider(provider: &str) -> Option<SelectedModel> {
    match provider {
        "ollama" => {
            let base_url = std::env::var("OLLAMA_BASE_URL").ok()?;
            let model =
                std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| OLLAMA_DEFAULT_MODEL.into());
            info!(model = %model, "Using Ollama for intent classification (local)");
            Some(SelectedModel {
                model: Arc::new(OpenAiCompatModel::ollama(base_url, model)),
                provider: "ollama".into(),
            })
        }
        "anthropic" => {
            let api_key = non_empty(std::env::var("ANTHROPIC_API_KEY").ok()?)?;
            info!("Using Claude Haiku for intent classification");
            Some(SelectedModel {
                model: Arc::new(AnthropicModel::new(api_key)),
                provider: "anthropic".into(),
            })
        }
        "google" => {
            let api_key = non_empty(std::env::var("GOOGLE_API_KEY").ok()?)?;
            let model =
                std::env::var("GOOGLE_MODEL").unwrap_or_else(|_| GOOGLE_DEFAULT_MODEL.into());
            info!(model = %model, "Using Gemini for intent classification");
            Some(SelectedModel {
                model: Arc::new(OpenAiCompatModel::google(api_key, model)),
                provider: "google".into(),
            })
        }
        "openai" => {
            let api_key = non_empty(std::env::var("OPENAI_API_KEY").ok()?)?;
            info!("Using GPT-4o-mini for intent classification");
            Some(SelectedModel {
                model: Arc::new(OpenAiCompatModel::openai(api_key, OPENAI_DEFAULT_MODEL)),
                provider: "openai".into(),
            })
        }
        _ => None,
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_yields_none() {
        assert!(try_provider("mainframe").is_none());
    }

    #[test]
    fn non_empty_filters_blank_keys() {
        assert_eq!(non_empty("  ".into()), None);
        assert_eq!(non_empty("sk-x".into()).as_deref(), Some("sk-x"));
    }
}
