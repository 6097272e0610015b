//! Error types for the Switchyard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all Switchyard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Authentication / API key errors ---
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    // --- Agent communication errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Conversation / repository errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- LLM provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Authentication and API-key errors.
///
/// Each variant carries a fixed machine code and HTTP status so the gateway
/// middleware can serialize it to `{"error", "message", "status_code"}`
/// without a lookup table.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("API key is required")]
    MissingApiKey,

    #[error("{0}")]
    InvalidApiKey(String),

    #[error("API key has expired. Expired at: {expires_at}")]
    ExpiredApiKey { expires_at: String },

    #[error("API key has been revoked. Revoked at: {revoked_at}{}", .reason.as_deref().map(|r| format!(". Reason: {r}")).unwrap_or_default())]
    RevokedApiKey {
        revoked_at: String,
        reason: Option<String>,
    },

    #[error("Organization is inactive")]
    OrganizationInactive,

    #[error("Insufficient scope. Required scope: {required}. Available scopes: {}", .available.join(", "))]
    InsufficientScope {
        required: String,
        available: Vec<String>,
    },

    #[error("API key limit exceeded. Current: {current}, Maximum: {max}")]
    KeyLimitExceeded { current: u32, max: u32 },

    #[error("Rate limit exceeded. Limit: {limit} requests per minute{}", .reset_at.as_deref().map(|r| format!(". Resets at: {r}")).unwrap_or_default())]
    RateLimitExceeded {
        limit: u32,
        reset_at: Option<String>,
    },

    #[error("Monthly quota exceeded. Usage: {used}/{quota} requests")]
    MonthlyQuotaExceeded { used: i64, quota: i64 },

    #[error("Failed to generate API key: {0}")]
    Generation(String),

    #[error("Failed to store API key: {0}")]
    Storage(String),
}

impl AuthError {
    /// The machine-readable error code serialized to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingApiKey => "missing_api_key",
            AuthError::InvalidApiKey(_) => "invalid_api_key",
            AuthError::ExpiredApiKey { .. } => "expired_api_key",
            AuthError::RevokedApiKey { .. } => "revoked_api_key",
            AuthError::OrganizationInactive => "organization_inactive",
            AuthError::InsufficientScope { .. } => "insufficient_scope",
            AuthError::KeyLimitExceeded { .. } => "api_key_limit_exceeded",
            AuthError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            AuthError::MonthlyQuotaExceeded { .. } => "monthly_quota_exceeded",
            AuthError::Generation(_) => "api_key_generation_error",
            AuthError::Storage(_) => "api_key_storage_error",
        }
    }

    /// The fixed HTTP status for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::MissingApiKey
            | AuthError::InvalidApiKey(_)
            | AuthError::ExpiredApiKey { .. }
            | AuthError::RevokedApiKey { .. } => 401,
            AuthError::OrganizationInactive
            | AuthError::InsufficientScope { .. }
            | AuthError::KeyLimitExceeded { .. } => 403,
            AuthError::RateLimitExceeded { .. } | AuthError::MonthlyQuotaExceeded { .. } => 429,
            AuthError::Generation(_) | AuthError::Storage(_) => 500,
        }
    }

    /// The JSON body returned at the middleware boundary.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
            status_code: self.status_code(),
        }
    }
}

/// Wire shape of an authentication error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// Errors from A2A communication with remote agents.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Agent returned error: {0}")]
    Rpc(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Circuit breaker '{0}' is open. Service unavailable.")]
    BreakerOpen(String),

    #[error("All agents failed. Last error: {0}")]
    AllFailed(String),
}

impl AgentError {
    /// Whether the client should retry this failure (timeouts and 5xx only).
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Timeout(_) => true,
            AgentError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Errors from conversation memory and its backing stores.
#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Errors from LLM completion providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unparseable completion: {0}")]
    BadCompletion(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_codes_and_statuses() {
        let cases: Vec<(AuthError, &str, u16)> = vec![
            (AuthError::MissingApiKey, "missing_api_key", 401),
            (
                AuthError::InvalidApiKey("Invalid API key".into()),
                "invalid_api_key",
                401,
            ),
            (AuthError::OrganizationInactive, "organization_inactive", 403),
            (
                AuthError::RateLimitExceeded {
                    limit: 10,
                    reset_at: None,
                },
                "rate_limit_exceeded",
                429,
            ),
            (
                AuthError::MonthlyQuotaExceeded {
                    used: 100,
                    quota: 100,
                },
                "monthly_quota_exceeded",
                429,
            ),
            (AuthError::Generation("rng".into()), "api_key_generation_error", 500),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn error_body_serializes_wire_shape() {
        let body = AuthError::MissingApiKey.to_body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "missing_api_key");
        assert_eq!(json["status_code"], 401);
        assert_eq!(json["message"], "API key is required");
    }

    #[test]
    fn revoked_message_includes_reason() {
        let err = AuthError::RevokedApiKey {
            revoked_at: "2026-01-01T00:00:00Z".into(),
            reason: Some("compromised".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("2026-01-01"));
        assert!(msg.contains("compromised"));
    }

    #[test]
    fn retryable_agent_errors() {
        assert!(AgentError::Timeout("30s".into()).is_retryable());
        assert!(
            AgentError::Http {
                status: 502,
                body: "bad gateway".into()
            }
            .is_retryable()
        );
        assert!(
            !AgentError::Http {
                status: 404,
                body: "not found".into()
            }
            .is_retryable()
        );
        assert!(!AgentError::Rpc("boom".into()).is_retryable());
    }
}
