//! A2A wire message types and stored conversation messages.
//!
//! The wire shape follows the A2A JSON-RPC convention:
//! `{"role": "user", "parts": [{"kind": "text", "text": "…"}], "messageId": "…"}`.
//! Parts are deliberately open-ended — anything that is not a text part is
//! carried as an opaque value and ignored at extraction sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The routing agent (responses)
    Agent,
    /// System-injected content
    System,
}

impl Role {
    /// Label used when rendering conversation context.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Agent => "Agent",
            Role::System => "System",
        }
    }
}

/// A text part on the wire: `{"kind": "text", "text": "…"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    #[serde(default = "text_kind")]
    pub kind: String,
    pub text: String,
}

fn text_kind() -> String {
    "text".into()
}

/// One part of a message. Non-text parts are preserved opaquely so a message
/// can round-trip through the router without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text(TextPart),
    Other(serde_json::Value),
}

impl Part {
    /// Build a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(TextPart {
            kind: text_kind(),
            text: text.into(),
        })
    }

    /// The text content, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(t) => Some(&t.text),
            // Historical payloads carry bare dicts with a "text" field.
            Part::Other(v) => v.get("text").and_then(|t| t.as_str()),
        }
    }
}

/// An A2A message as sent and received over JSON-RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aMessage {
    pub role: Role,

    #[serde(default)]
    pub parts: Vec<Part>,

    #[serde(rename = "messageId")]
    pub message_id: String,

    /// Optional envelope metadata (classification info on responses).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl A2aMessage {
    /// Create a user message with a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
            message_id: Uuid::new_v4().to_string(),
            metadata: None,
        }
    }

    /// Create an agent (response) message with a single text part.
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            parts: vec![Part::text(text)],
            message_id: Uuid::new_v4().to_string(),
            metadata: None,
        }
    }

    /// Attach envelope metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Use a caller-supplied message id instead of a generated one.
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = id.into();
        self
    }

    /// Concatenated text of all text parts, non-text parts ignored.
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }

    /// Text parts joined with a single space (delegation reply format).
    pub fn text_joined(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A message as stored in conversation memory and mirrored to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl StoredMessage {
    /// Create a message with the given role and content, timestamped now.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
            intent: None,
            model_used: None,
            cost: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }
}
