//! Security plane for Switchyard — key generation, rate limiting, circuit
//! breaking, audit logging, and content guardrails.
//!
//! Provides:
//! - **Keygen**: prefixed high-entropy API keys, SHA-256 hashing, constant-time verification
//! - **Rate limiting**: multi-window sliding limiter plus a per-key minute limiter
//! - **Circuit breakers**: per-upstream Closed/Open/Half-Open state machines
//! - **Audit**: append-only daily JSONL event log with an optional repository mirror
//! - **Guardrails**: input/output validation, PII detection and redaction, injection checks

pub mod audit;
pub mod breaker;
pub mod guardrails;
pub mod keygen;
pub mod ratelimit;

pub use audit::{AuditEvent, AuditLog, AuditSeverity, AuditStore};
pub use breaker::{BreakerManager, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use guardrails::{Guardrails, PiiKind};
pub use keygen::GeneratedKey;
pub use ratelimit::{ApiKeyRateLimiter, RateInfo, SlidingWindowLimiter};
