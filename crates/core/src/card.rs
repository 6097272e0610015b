//! Agent card — metadata describing one remote agent.

use serde::{Deserialize, Serialize};

/// Metadata for a remote agent: where it lives and what it can do.
///
/// Cards are read-mostly; re-registration under the same name replaces the
/// previous card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    /// Unique identifier for the agent
    pub name: String,

    /// Base URL where the agent is accessible
    pub url: String,

    /// Capabilities the agent provides (free-form tags)
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Agent version string
    #[serde(default = "default_version")]
    pub version: String,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_version() -> String {
    "1.0.0".into()
}

impl AgentCard {
    /// Create a card with just a name and URL.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            capabilities: Vec::new(),
            description: String::new(),
            version: default_version(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Display name: underscores to spaces, each word title-cased.
    /// `"insurance_agent"` renders as `"Insurance Agent"`.
    pub fn display_name(&self) -> String {
        self.name
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_defaults_from_minimal_json() {
        let card: AgentCard = serde_json::from_value(serde_json::json!({
            "name": "weather_agent",
            "url": "http://localhost:9001"
        }))
        .unwrap();
        assert_eq!(card.version, "1.0.0");
        assert!(card.capabilities.is_empty());
        assert!(card.description.is_empty());
    }

    #[test]
    fn display_name_title_cases_underscored_names() {
        let card = AgentCard::new("insurance_agent", "http://localhost:9002");
        assert_eq!(card.display_name(), "Insurance Agent");
    }

    #[test]
    fn card_roundtrip_with_capabilities() {
        let card = AgentCard::new("analytics_agent", "http://localhost:9003")
            .with_capabilities(vec!["analytics".into(), "reporting".into()])
            .with_description("Crunches numbers");
        let json = serde_json::to_string(&card).unwrap();
        let back: AgentCard = serde_json::from_str(&json).unwrap();
        assert_eq!(back, card);
    }
}
