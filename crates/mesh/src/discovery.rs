//! Agent discovery and registry.
//!
//! Cards come from three sources, in load order: environment variables
//! (`AGENT_<NAME>_URL` / `AGENT_<NAME>_CAPABILITIES`, names lowercased), a
//! JSON configuration file of shape `{"agents": [...]}`, and programmatic
//! registration. Lookups by name are case-sensitive.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use switchyard_core::AgentCard;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATHS: &[&str] = &["agents_config.json", "config/agents.json", ".agents.json"];

/// A name → [`AgentCard`] map, read-mostly.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentCard>>,
}

impl AgentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry loaded from the environment and a config file. When
    /// `config_path` is unset, a short list of default locations is tried.
    pub fn with_sources(config_path: Option<&Path>) -> Self {
        let registry = Self::new();
        registry.load_from_env();

        match config_path {
            Some(path) => {
                if path.exists() {
                    registry.load_from_file(path);
                } else {
                    warn!(path = %path.display(), "External agents config not found");
                }
            }
            None => {
                for candidate in DEFAULT_CONFIG_PATHS {
                    let path = Path::new(candidate);
                    if path.exists() {
                        registry.load_from_file(path);
                        break;
                    }
                }
            }
        }
        registry
    }

    /// Scan the environment for `AGENT_<NAME>_URL` / `AGENT_<NAME>_CAPABILITIES`
    /// pairs. Names are lowercased; an agent without a URL is ignored.
    pub fn load_from_env(&self) {
        let mut urls: HashMap<String, String> = HashMap::new();
        let mut capabilities: HashMap<String, Vec<String>> = HashMap::new();

        for (key, value) in std::env::vars() {
            if let Some(name) = key.strip_prefix("AGENT_").and_then(|k| k.strip_suffix("_URL")) {
                urls.insert(name.to_lowercase(), value);
            } else if let Some(name) = key
                .strip_prefix("AGENT_")
                .and_then(|k| k.strip_suffix("_CAPABILITIES"))
            {
                capabilities.insert(
                    name.to_lowercase(),
                    value
                        .split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect(),
                );
            }
        }

        for (name, url) in urls {
            let caps = capabilities.remove(&name).unwrap_or_default();
            let card = AgentCard::new(&name, url)
                .with_capabilities(caps)
                .with_description(format!("Agent loaded from environment: {name}"));
            info!(agent = %name, "Registered agent from environment");
            self.register(card);
        }
    }

    /// Load cards from a `{"agents": [...]}` JSON file. A malformed file is
    /// logged and skipped.
    pub fn load_from_file(&self, path: &Path) {
        let parsed: Result<serde_json::Value, _> = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));

        match parsed {
            Ok(config) => {
                let cards = config
                    .get("agents")
                    .and_then(|a| a.as_array())
                    .cloned()
                    .unwrap_or_default();
                let mut count = 0usize;
                for value in cards {
                    match serde_json::from_value::<AgentCard>(value) {
                        Ok(card) => {
                            self.register(card);
                            count += 1;
                        }
                        Err(e) => warn!(path = %path.display(), error = %e, "Skipping malformed agent card"),
                    }
                }
                info!(path = %path.display(), count, "Loaded external agents configuration");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to load agents config"),
        }
    }

    /// Save the current registry as `{"agents": [...]}` JSON.
    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let agents = self.list();
        let config = serde_json::json!({ "agents": agents });
        std::fs::write(path, serde_json::to_string_pretty(&config)?)
    }

    /// Register a card, replacing any card with the same name.
    pub fn register(&self, card: AgentCard) {
        self.agents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(card.name.clone(), card);
    }

    /// Remove an agent. Returns whether it existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.agents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .is_some()
    }

    /// Lookup by exact name.
    pub fn get(&self, name: &str) -> Option<AgentCard> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// First agent advertising a capability.
    pub fn find_by_capability(&self, capability: &str) -> Option<AgentCard> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|card| card.capabilities.iter().any(|c| c == capability))
            .cloned()
    }

    /// All agents advertising a capability.
    pub fn find_all_by_capability(&self, capability: &str) -> Vec<AgentCard> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|card| card.capabilities.iter().any(|c| c == capability))
            .cloned()
            .collect()
    }

    /// Snapshot of all registered cards.
    pub fn list(&self) -> Vec<AgentCard> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// All registered names.
    pub fn names(&self) -> Vec<String> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Sorted union of every advertised capability.
    pub fn capabilities(&self) -> Vec<String> {
        let agents = self.agents.read().unwrap_or_else(|e| e.into_inner());
        let mut caps: Vec<String> = agents
            .values()
            .flat_map(|card| card.capabilities.iter().cloned())
            .collect();
        caps.sort();
        caps.dedup();
        caps
    }

    pub fn len(&self) -> usize {
        self.agents.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }
}
