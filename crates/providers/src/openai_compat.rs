//! OpenAI-compatible chat-completions provider.
//!
//! Covers every backend that speaks `POST {base}/chat/completions`: OpenAI
//! itself, Ollama's compatibility endpoint, and Google's OpenAI-compatible
//! Gemini surface. An empty API key omits the Authorization header (local
//! Ollama).

use crate::CompletionModel;
use async_trait::async_trait;
use switchyard_core::ProviderError;
use tracing::debug;

/// A chat-completions client for any OpenAI-compatible backend.
pub struct OpenAiCompatModel {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// Ollama's OpenAI-compatible endpoint on a local daemon.
    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base = format!("{}/v1", base_url.into().trim_end_matches('/'));
        Self::new("ollama", base, "", model)
    }

    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key, model)
    }

    /// Gemini through Google's OpenAI-compatibility surface.
    pub fn google(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(
            "google",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            api_key,
            model,
        )
    }
}

#[async_trait]
impl CompletionModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [{"role": "user", "content": prompt}],
        });

        debug!(provider = %self.name, model = %self.model, "Sending completion request");

        let mut request = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status_code: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::BadCompletion(e.to_string()))?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| ProviderError::BadCompletion("no message content".into()))
    }
}
