//! Per-request authentication context and key environments.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The environment an API key belongs to, embedded in its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEnvironment {
    Live,
    Test,
}

impl KeyEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyEnvironment::Live => "live",
            KeyEnvironment::Test => "test",
        }
    }
}

impl std::fmt::Display for KeyEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KeyEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(KeyEnvironment::Live),
            "test" => Ok(KeyEnvironment::Test),
            other => Err(format!("Environment must be 'live' or 'test', got '{other}'")),
        }
    }
}

/// Request-scoped record derived from a validated API key.
///
/// Built by the middleware, attached to the request, dropped when the
/// response is sent. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub key_id: Uuid,
    pub organization_id: Uuid,
    pub scopes: Vec<String>,
    /// Effective per-minute rate: the key's custom limit, falling back to the
    /// organization default.
    pub rate_limit: u32,
    pub environment: KeyEnvironment,
    pub monthly_limit: i64,
}

impl AuthContext {
    /// Whether this context satisfies a required scope (`*` grants all).
    pub fn has_scope(&self, required: &str) -> bool {
        self.scopes.iter().any(|s| s == "*" || s == required)
    }
}
