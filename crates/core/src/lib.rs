//! # Switchyard Core
//!
//! Domain types and error definitions for the Switchyard A2A routing runtime.
//! This crate has **zero framework dependencies** — it defines the value
//! objects and error sums that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every bounded context gets its own error enum here, and every wire or
//! persisted shape lives here as a plain serde type. Implementations live in
//! their respective crates, so the dependency graph points inward on core.

pub mod auth;
pub mod card;
pub mod error;
pub mod intent;
pub mod message;

// Re-export key types at crate root for ergonomics
pub use auth::{AuthContext, KeyEnvironment};
pub use card::AgentCard;
pub use error::{AgentError, AuthError, Error, MemoryError, ProviderError, Result};
pub use intent::Intent;
pub use message::{A2aMessage, Part, Role, StoredMessage, TextPart};
