//! TTL cache for intent classifications.
//!
//! Keys are a fixed hash of the lowercased, trimmed text so trivial
//! whitespace/case variations share an entry. Expired entries are evicted
//! lazily on lookup.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use switchyard_core::Intent;

pub struct IntentCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Intent, DateTime<Utc>)>>,
}

impl IntentCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs as i64),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.trim().to_lowercase().as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Cached intent, if present and within TTL. Expired entries are removed.
    pub fn get(&self, text: &str) -> Option<Intent> {
        let key = Self::key(text);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(&key) {
            Some((intent, cached_at)) if Utc::now() - *cached_at < self.ttl => Some(*intent),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, text: &str, intent: Intent) {
        let key = Self::key(text);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, (intent, Utc::now()));
    }

    /// Drop every expired entry.
    pub fn clear_expired(&self) {
        let now = Utc::now();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, (_, cached_at)| now - *cached_at < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
