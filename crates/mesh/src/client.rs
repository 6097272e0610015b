//! JSON-RPC agent client and connection pool.
//!
//! The client speaks JSON-RPC 2.0 over HTTP POST with auto-incrementing
//! request ids. Retry policy: exponential back-off of `retry_delay × (attempt
//! + 1)`, only on network timeouts and HTTP 5xx — 4xx responses and JSON-RPC
//! `error` objects fail fast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchyard_core::{A2aMessage, AgentError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Client tunables shared by every client in a pool.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// A JSON-RPC 2.0 client bound to one agent URL.
pub struct AgentClient {
    url: String,
    config: ClientConfig,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl AgentClient {
    pub fn new(url: impl Into<String>, config: ClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            url: url.into().trim_end_matches('/').to_string(),
            config,
            http,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Send a message via `method` (default wire method is `message/send`)
    /// and parse the reply message.
    pub async fn send_message(
        &self,
        message: &A2aMessage,
        method: &str,
    ) -> Result<A2aMessage, AgentError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": { "message": message },
            "id": self.next_request_id(),
        });

        let mut last_error = AgentError::Network("no attempts made".into());

        for attempt in 0..self.config.max_retries {
            let response = match self.http.post(&self.url).json(&payload).send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    last_error = AgentError::Timeout(e.to_string());
                    if attempt + 1 < self.config.max_retries {
                        self.backoff(attempt).await;
                        continue;
                    }
                    break;
                }
                Err(e) => return Err(AgentError::Network(e.to_string())),
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let error = AgentError::Http {
                    status: status.as_u16(),
                    body,
                };
                if error.is_retryable() && attempt + 1 < self.config.max_retries {
                    warn!(url = %self.url, status = status.as_u16(), attempt, "Retrying after server error");
                    last_error = error;
                    self.backoff(attempt).await;
                    continue;
                }
                return Err(error);
            }

            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;

            if let Some(error) = json.get("error") {
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("Unknown error");
                return Err(AgentError::Rpc(message.to_string()));
            }

            return match json.get("result") {
                Some(result) => serde_json::from_value(result.clone())
                    .map_err(|e| AgentError::InvalidResponse(e.to_string())),
                None => Err(AgentError::InvalidResponse(
                    "response carries neither result nor error".into(),
                )),
            };
        }

        Err(last_error)
    }

    /// Delegate a task: wrap the text in a user message and return the
    /// space-joined text of all text parts in the reply.
    pub async fn delegate_task(
        &self,
        task: &str,
        task_id: Option<&str>,
    ) -> Result<String, AgentError> {
        let mut message = A2aMessage::user(task);
        if let Some(id) = task_id {
            message = message.with_message_id(id);
        }

        debug!(url = %self.url, task_len = task.len(), "Delegating task");
        let reply = self.send_message(&message, "message/send").await?;
        Ok(reply.text_joined())
    }

    /// Convenience alias for delegating plain text.
    pub async fn send_text(&self, text: &str, task_id: Option<&str>) -> Result<String, AgentError> {
        self.delegate_task(text, task_id).await
    }

    /// `GET {url}/info`.
    pub async fn agent_info(&self) -> Result<serde_json::Value, AgentError> {
        let response = self
            .http
            .get(format!("{}/info", self.url))
            .send()
            .await
            .map_err(|e| AgentError::Network(format!("Failed to get agent info: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))
    }

    /// `GET {url}/health` with a 5 s timeout. Any failure is unhealthy.
    pub async fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/health", self.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn backoff(&self, attempt: u32) {
        tokio::time::sleep(self.config.retry_delay * (attempt + 1)).await;
    }
}

/// One shared client per agent URL.
pub struct ClientPool {
    config: ClientConfig,
    clients: Mutex<HashMap<String, Arc<AgentClient>>>,
}

impl ClientPool {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the client for a URL. Idempotent.
    pub fn get_client(&self, url: &str) -> Arc<AgentClient> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(AgentClient::new(url, self.config)))
            .clone()
    }

    /// Dispose of every client. Dropping a reqwest client closes its idle
    /// connections, so awaiting this is sufficient for clean teardown.
    pub async fn close_all(&self) {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A correlation id for delegations without a caller-supplied task id.
    pub fn fresh_task_id() -> String {
        Uuid::new_v4().to_string()
    }
}

impl Default for ClientPool {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}
