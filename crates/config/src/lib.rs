//! Configuration loading and validation for Switchyard.
//!
//! All configuration is environment-driven; every knob has a serde default so
//! the runtime starts with zero configuration. Secrets are redacted from
//! `Debug` output.

use serde::{Deserialize, Serialize};

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gateway bind settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// API security middleware settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// Intent classifier settings
    #[serde(default)]
    pub intent: IntentConfig,

    /// Conversation memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Agent registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// A2A client settings
    #[serde(default)]
    pub a2a: A2aConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Audit log settings
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            security: SecurityConfig::default(),
            intent: IntentConfig::default(),
            memory: MemoryConfig::default(),
            registry: RegistryConfig::default(),
            a2a: A2aConfig::default(),
            database: DatabaseConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("gateway", &self.gateway)
            .field("security", &self.security)
            .field("intent", &self.intent)
            .field("memory", &self.memory)
            .field("registry", &self.registry)
            .field("a2a", &self.a2a)
            .field("database", &self.database)
            .field("audit", &self.audit)
            .finish()
    }
}

impl AppConfig {
    /// Build the full configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            gateway: GatewayConfig {
                host: env_or("GATEWAY_HOST", default_host),
                port: env_parse("GATEWAY_PORT", default_port),
            },
            security: SecurityConfig {
                enable_api_security: env_bool("ENABLE_API_SECURITY", false),
                demo_api_key: std::env::var("DEMO_API_KEY").ok(),
                allowed_origins: std::env::var("ALLOWED_ORIGINS")
                    .map(|v| {
                        v.split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", default_rate_minute),
                rate_limit_per_hour: env_parse("RATE_LIMIT_PER_HOUR", default_rate_hour),
                rate_limit_per_day: env_parse("RATE_LIMIT_PER_DAY", default_rate_day),
            },
            intent: IntentConfig {
                use_llm: env_bool("USE_LLM_INTENT", true),
                provider: std::env::var("INTENT_LLM_PROVIDER")
                    .or_else(|_| std::env::var("LLM_PROVIDER"))
                    .ok()
                    .map(|p| p.to_lowercase())
                    .filter(|p| !p.is_empty()),
                confidence_threshold: env_parse("INTENT_CONFIDENCE_THRESHOLD", default_confidence),
                cache_ttl_secs: env_parse("INTENT_CACHE_TTL_SECS", default_cache_ttl),
            },
            memory: MemoryConfig {
                window_size: env_parse("CONVERSATION_WINDOW_SIZE", default_window),
                use_database: env_bool("USE_DATABASE", false),
                max_age_hours: env_parse("CONVERSATION_MAX_AGE_HOURS", default_max_age),
            },
            registry: RegistryConfig {
                config_path: std::env::var("EXTERNAL_AGENTS_CONFIG").ok(),
            },
            a2a: A2aConfig {
                enabled: env_bool("ENABLE_A2A", true),
                timeout_secs: env_parse("A2A_TIMEOUT_SECS", default_a2a_timeout),
                max_retries: env_parse("A2A_MAX_RETRIES", default_retries),
                retry_delay_ms: env_parse("A2A_RETRY_DELAY_MS", default_retry_delay),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").ok(),
                sqlite_path: env_or("SQLITE_DB_PATH", default_sqlite_path),
                pool_size: env_parse("DB_POOL_SIZE", default_pool_size),
            },
            audit: AuditConfig {
                dir: env_or("AUDIT_LOG_DIR", default_audit_dir),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Whether the API-key middleware guards non-public paths.
    #[serde(default)]
    pub enable_api_security: bool,

    /// A plaintext key seeded into the store at startup for local demos.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo_api_key: Option<String>,

    /// CORS origins. Empty means same-origin only.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_rate_minute")]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_rate_hour")]
    pub rate_limit_per_hour: u32,
    #[serde(default = "default_rate_day")]
    pub rate_limit_per_day: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_api_security: false,
            demo_api_key: None,
            allowed_origins: Vec::new(),
            rate_limit_per_minute: default_rate_minute(),
            rate_limit_per_hour: default_rate_hour(),
            rate_limit_per_day: default_rate_day(),
        }
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("enable_api_security", &self.enable_api_security)
            .field("demo_api_key", &redact(&self.demo_api_key))
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("rate_limit_per_hour", &self.rate_limit_per_hour)
            .field("rate_limit_per_day", &self.rate_limit_per_day)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    #[serde(default = "default_true")]
    pub use_llm: bool,

    /// Forced provider name; `None` auto-detects in preference order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            use_llm: true,
            provider: None,
            confidence_threshold: default_confidence(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_window")]
    pub window_size: usize,
    #[serde(default)]
    pub use_database: bool,
    #[serde(default = "default_max_age")]
    pub max_age_hours: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_size: default_window(),
            use_database: false,
            max_age_hours: default_max_age(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path to the external agents JSON file; default locations are tried
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_a2a_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for A2aConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_a2a_timeout(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Full database URL; overrides `sqlite_path` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            sqlite_path: default_sqlite_path(),
            pool_size: default_pool_size(),
        }
    }
}

impl DatabaseConfig {
    /// Connection string: explicit URL when given, SQLite file otherwise.
    pub fn connection_string(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("sqlite://{}", self.sqlite_path))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_dir")]
    pub dir: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            dir: default_audit_dir(),
        }
    }
}

// --- defaults ---

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}
fn default_confidence() -> f32 {
    0.8
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_window() -> usize {
    10
}
fn default_max_age() -> u64 {
    24
}
fn default_rate_minute() -> u32 {
    10
}
fn default_rate_hour() -> u32 {
    100
}
fn default_rate_day() -> u32 {
    1000
}
fn default_a2a_timeout() -> u64 {
    30
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_sqlite_path() -> String {
    "switchyard.db".into()
}
fn default_pool_size() -> u32 {
    4
}
fn default_audit_dir() -> String {
    "logs/audit".into()
}

// --- env helpers ---

fn env_or(key: &str, default: fn() -> String) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => v.to_lowercase() == "true" || v == "1",
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: fn() -> T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(default)
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}
