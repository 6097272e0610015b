//! HTTP JSON-RPC gateway for Switchyard.
//!
//! Exposes the A2A endpoint at `/` (JSON-RPC `message/send` plus workflow
//! methods), health/readiness/metrics probes, and the admin surface for
//! organizations and keys. Security layers: API-key middleware (optional),
//! CORS from `ALLOWED_ORIGINS`, request body size limit, HTTP trace logging.
//!
//! Everything is built once at startup and shared via `Arc` — no process
//! globals; tests construct isolated states freely.

pub mod admin;
pub mod middleware;
pub mod rpc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderValue;
use axum::response::Json;
use axum::routing::{get, post};
use axum::{Router, middleware as axum_middleware};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use switchyard_auth::{ApiKeyService, ApiKeyStore, OrganizationStore, SqliteAuthStore, UsageStore};
use switchyard_config::AppConfig;
use switchyard_core::AgentCard;
use switchyard_intent::{ClassifierConfig, IntentClassifier};
use switchyard_memory::{ConversationMemory, ConversationStore, SqliteConversationStore};
use switchyard_mesh::{AgentRegistry, ClientConfig, ClientPool};
use switchyard_router::{PrincipalRouter, RouterConfig};
use switchyard_security::{
    ApiKeyRateLimiter, AuditLog, BreakerManager, Guardrails, SlidingWindowLimiter,
};
use switchyard_workflow::Orchestrator;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub router: Arc<PrincipalRouter>,
    pub orchestrator: Arc<Orchestrator>,
    pub service: Arc<ApiKeyService>,
    pub key_limiter: Arc<ApiKeyRateLimiter>,
    pub registry: Arc<AgentRegistry>,
    pub memory: Arc<ConversationMemory>,
    pub breakers: Arc<BreakerManager>,
    pub classifier: Arc<IntentClassifier>,
    pub audit: Arc<AuditLog>,
    pub start_time: DateTime<Utc>,
    pub requests_total: AtomicU64,
}

pub type SharedState = Arc<GatewayState>;

/// Auth store triple handed to [`build_state`].
pub struct AuthStores {
    pub orgs: Arc<dyn OrganizationStore>,
    pub keys: Arc<dyn ApiKeyStore>,
    pub usage: Arc<dyn UsageStore>,
}

/// Wire every subsystem once and share it.
pub fn build_state(
    config: AppConfig,
    stores: AuthStores,
    conversation_store: Option<Arc<dyn ConversationStore>>,
) -> SharedState {
    let audit = Arc::new(AuditLog::new(&config.audit.dir));
    let limiter = Arc::new(SlidingWindowLimiter::new(
        config.security.rate_limit_per_minute,
        config.security.rate_limit_per_hour,
        config.security.rate_limit_per_day,
    ));
    let guardrails = Arc::new(Guardrails::new(limiter, audit.clone()));

    let selected = if config.intent.use_llm {
        switchyard_providers::select_model(config.intent.provider.as_deref())
    } else {
        None
    };
    let classifier = Arc::new(IntentClassifier::new(
        ClassifierConfig {
            use_llm: config.intent.use_llm,
            confidence_threshold: config.intent.confidence_threshold,
            cache_ttl_secs: config.intent.cache_ttl_secs,
            enable_cache: true,
        },
        selected,
    ));

    let mut memory = ConversationMemory::new(config.memory.window_size, config.memory.max_age_hours);
    if let Some(store) = conversation_store {
        memory = memory.with_store(store);
    }
    let memory = Arc::new(memory);

    let registry = Arc::new(AgentRegistry::with_sources(
        config.registry.config_path.as_deref().map(std::path::Path::new),
    ));

    let pool = Arc::new(ClientPool::new(ClientConfig {
        timeout: std::time::Duration::from_secs(config.a2a.timeout_secs),
        max_retries: config.a2a.max_retries,
        retry_delay: std::time::Duration::from_millis(config.a2a.retry_delay_ms),
    }));
    let breakers = Arc::new(BreakerManager::new());

    let service = Arc::new(
        ApiKeyService::new(stores.orgs, stores.keys, stores.usage).with_audit(audit.clone()),
    );

    let router = Arc::new(
        PrincipalRouter::new(
            guardrails,
            classifier.clone(),
            memory.clone(),
            registry.clone(),
            pool.clone(),
            breakers.clone(),
        )
        .with_config(RouterConfig {
            enable_a2a: config.a2a.enabled,
            ..RouterConfig::default()
        }),
    );

    let orchestrator = Arc::new(Orchestrator::new(registry.clone(), pool));

    Arc::new(GatewayState {
        config,
        router,
        orchestrator,
        service,
        key_limiter: Arc::new(ApiKeyRateLimiter::new()),
        registry,
        memory,
        breakers,
        classifier,
        audit,
        start_time: Utc::now(),
        requests_total: AtomicU64::new(0),
    })
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let mut app = Router::new()
        .route("/", post(rpc::rpc_handler).get(discovery_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/admin", admin::admin_router());

    if state.config.security.enable_api_security {
        app = app.layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key_middleware,
        ));
    }

    let cors = cors_layer(&state.config.security.allowed_origins);

    app.with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if origins.is_empty() {
        // Same-origin only
        return CorsLayer::new();
    }
    CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::list(origins))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Start the gateway: build stores from config, seed the demo key when
/// configured, bind, and serve.
pub async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let auth_store = Arc::new(
        SqliteAuthStore::with_pool_size(
            &config.database.connection_string(),
            config.database.pool_size,
        )
        .await?,
    );
    let conversation_store: Option<Arc<dyn ConversationStore>> = if config.memory.use_database {
        match SqliteConversationStore::new(&config.database.connection_string()).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(error = %e, "Conversation persistence unavailable, memory-only");
                None
            }
        }
    } else {
        None
    };

    let state = build_state(
        config.clone(),
        AuthStores {
            orgs: auth_store.clone(),
            keys: auth_store.clone(),
            usage: auth_store,
        },
        conversation_store,
    );

    if let Some(demo_key) = &config.security.demo_api_key {
        match state.service.seed_plaintext_key(demo_key, "demo").await {
            Ok(Some(id)) => info!(key_id = %id, "Seeded demo API key"),
            Ok(None) => info!("Demo API key already present"),
            Err(e) => warn!(error = %e, "Failed to seed demo API key"),
        }
    }

    let app = build_router(state);
    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

// --- probes ---

/// Agent discovery: the principal's card.
async fn discovery_handler(State(state): State<SharedState>) -> Json<AgentCard> {
    let mut card = AgentCard::new("switchyard", format!(
        "http://{}:{}",
        state.config.gateway.host, state.config.gateway.port
    ))
    .with_capabilities(vec![
        "tickets".into(),
        "account".into(),
        "payments".into(),
        "general".into(),
        "routing".into(),
        "workflows".into(),
    ])
    .with_description("A2A routing and orchestration runtime");
    card.version = env!("CARGO_PKG_VERSION").into();
    Json(card)
}

async fn health_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let breaker_states: Vec<serde_json::Value> = state
        .breakers
        .snapshots()
        .into_iter()
        .map(|snapshot| serde_json::json!({ "name": snapshot.name, "state": snapshot.state }))
        .collect();

    Json(serde_json::json!({
        "status": "healthy",
        "checks": {
            "registry_agents": state.registry.len(),
            "active_conversations": state.memory.conversation_count(),
            "circuit_breakers": breaker_states,
            "llm_classifier": state.classifier.llm_enabled(),
        },
        "uptime_seconds": (Utc::now() - state.start_time).num_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ready_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    // The gateway is ready once state exists; external agents are optional.
    Json(serde_json::json!({
        "ready": true,
        "checks": {
            "registry": true,
            "memory": true,
            "security_enabled": state.config.security.enable_api_security,
        },
    }))
}

async fn metrics_handler(State(state): State<SharedState>) -> String {
    let classifier = state.classifier.metrics();
    let mut out = String::new();

    let gauges: &[(&str, &str, u64)] = &[
        (
            "switchyard_requests_total",
            "Total JSON-RPC requests received",
            state.requests_total.load(Ordering::Relaxed),
        ),
        (
            "switchyard_registry_agents",
            "Registered remote agents",
            state.registry.len() as u64,
        ),
        (
            "switchyard_active_conversations",
            "Conversations resident in memory",
            state.memory.conversation_count() as u64,
        ),
        (
            "switchyard_intent_requests_total",
            "Intent classification requests",
            classifier.total_requests,
        ),
        (
            "switchyard_intent_cache_hits_total",
            "Intent cache hits",
            classifier.cache_hits,
        ),
        (
            "switchyard_intent_llm_calls_total",
            "Intent LLM tier invocations",
            classifier.llm_calls,
        ),
    ];

    for (name, help, value) in gauges {
        out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"));
    }
    out
}
