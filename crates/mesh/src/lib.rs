//! Agent mesh — discovery of remote agents and pooled JSON-RPC clients.
//!
//! The registry knows *who* exists (name, URL, capabilities); the client
//! knows *how* to talk to them (JSON-RPC 2.0 over HTTP POST with bounded
//! retry). The pool shares one client per URL across the router and the
//! workflow orchestrator.

pub mod client;
pub mod discovery;

pub use client::{AgentClient, ClientConfig, ClientPool};
pub use discovery::AgentRegistry;
