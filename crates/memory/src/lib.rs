//! Conversation memory — bounded per-conversation message logs.
//!
//! Conversations are created lazily on first message, trimmed to the most
//! recent `max_messages`, and expired after `max_age_hours` of inactivity.
//! When a [`ConversationStore`] is attached, every append is mirrored to it
//! and cold reads fall back to it; store errors never block the in-memory
//! path.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use switchyard_core::{MemoryError, Role, StoredMessage};

pub use sqlite::SqliteConversationStore;

/// Persistence contract for conversation history.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation record (idempotent on existing ids).
    async fn create_conversation(
        &self,
        id: &str,
        title: &str,
        intent: Option<&str>,
    ) -> Result<(), MemoryError>;

    /// Append one message to a conversation.
    async fn append_message(
        &self,
        conversation_id: &str,
        message: &StoredMessage,
    ) -> Result<(), MemoryError>;

    /// The most recent messages in chronological order.
    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, MemoryError>;
}

struct ConversationState {
    messages: Vec<StoredMessage>,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    message_count: u64,
}

/// In-memory conversation history with optional store mirroring.
pub struct ConversationMemory {
    max_messages: usize,
    max_age_hours: u64,
    conversations: Mutex<HashMap<String, ConversationState>>,
    store: Option<Arc<dyn ConversationStore>>,
}

impl ConversationMemory {
    pub fn new(max_messages: usize, max_age_hours: u64) -> Self {
        Self {
            max_messages,
            max_age_hours,
            conversations: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// Attach a persistence mirror.
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Append a message, creating the conversation lazily.
    ///
    /// The in-memory tail is trimmed to `max_messages`; the mirror keeps the
    /// full log. The map lock is released before any store I/O.
    pub async fn add_message(&self, conversation_id: &str, message: StoredMessage) {
        let intent = message.intent.clone();
        let is_new = {
            let mut conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
            let now = Utc::now();
            let is_new = !conversations.contains_key(conversation_id);
            let state = conversations
                .entry(conversation_id.to_string())
                .or_insert_with(|| ConversationState {
                    messages: Vec::new(),
                    created_at: now,
                    last_updated: now,
                    message_count: 0,
                });
            state.messages.push(message.clone());
            state.last_updated = now;
            state.message_count += 1;
            if state.messages.len() > self.max_messages {
                let excess = state.messages.len() - self.max_messages;
                state.messages.drain(..excess);
            }
            is_new
        };

        if let Some(store) = &self.store {
            if is_new {
                let title = short_title(conversation_id);
                if let Err(e) = store
                    .create_conversation(conversation_id, &title, intent.as_deref())
                    .await
                {
                    tracing::warn!(conversation = conversation_id, error = %e, "Failed to create conversation in store");
                }
            }
            if let Err(e) = store.append_message(conversation_id, &message).await {
                tracing::warn!(conversation = conversation_id, error = %e, "Failed to persist message");
            }
        }
    }

    /// The conversation tail in chronological order.
    ///
    /// Falls back to the store for conversations not resident in memory.
    pub async fn get_history(
        &self,
        conversation_id: &str,
        max_messages: Option<usize>,
    ) -> Vec<StoredMessage> {
        let resident = {
            let conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
            conversations
                .get(conversation_id)
                .map(|state| state.messages.clone())
        };

        let mut messages = match resident {
            Some(messages) => messages,
            None => match &self.store {
                Some(store) => store
                    .recent_messages(conversation_id, max_messages.unwrap_or(self.max_messages))
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(conversation = conversation_id, error = %e, "Store read failed");
                        Vec::new()
                    }),
                None => Vec::new(),
            },
        };

        if let Some(max) = max_messages {
            if messages.len() > max {
                messages.drain(..messages.len() - max);
            }
        }
        messages
    }

    /// Render the tail as `User:` / `Agent:` lines.
    pub async fn context_summary(&self, conversation_id: &str) -> String {
        let history = self.get_history(conversation_id, None).await;
        if history.is_empty() {
            return "No previous conversation history.".into();
        }

        let mut lines = vec!["Previous conversation:".to_string()];
        for message in &history {
            lines.push(format!("{}: {}", message.role.label(), message.content));
        }
        lines.join("\n")
    }

    /// Drop conversations idle longer than `max_age_hours`. Returns how many
    /// were removed.
    pub fn cleanup_old(&self) -> usize {
        let cutoff = Utc::now() - Duration::hours(self.max_age_hours as i64);
        let mut conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        let before = conversations.len();
        conversations.retain(|_, state| state.last_updated >= cutoff);
        before - conversations.len()
    }

    pub fn clear_conversation(&self, conversation_id: &str) {
        self.conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(conversation_id);
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Messages currently resident for a conversation.
    pub fn message_count(&self, conversation_id: &str) -> usize {
        self.conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .map(|state| state.messages.len())
            .unwrap_or(0)
    }

    /// Total messages ever appended to a conversation (pre-trim).
    pub fn total_appended(&self, conversation_id: &str) -> u64 {
        self.conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .map(|state| state.message_count)
            .unwrap_or(0)
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(10, 24)
    }
}

fn short_title(conversation_id: &str) -> String {
    let prefix: String = conversation_id.chars().take(8).collect();
    format!("Conversation {prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_conversation_lazily_and_appends() {
        let memory = ConversationMemory::new(10, 24);
        assert_eq!(memory.conversation_count(), 0);

        memory
            .add_message("c1", StoredMessage::new(Role::User, "hello"))
            .await;
        memory
            .add_message("c1", StoredMessage::new(Role::Agent, "hi there"))
            .await;

        assert_eq!(memory.conversation_count(), 1);
        let history = memory.get_history("c1", None).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Agent);
    }

    #[tokio::test]
    async fn trims_to_max_messages_keeping_most_recent() {
        let memory = ConversationMemory::new(3, 24);
        for i in 0..6 {
            memory
                .add_message("c1", StoredMessage::new(Role::User, format!("msg {i}")))
                .await;
        }
        let history = memory.get_history("c1", None).await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "msg 3");
        assert_eq!(history[2].content, "msg 5");
        assert_eq!(memory.total_appended("c1"), 6);
    }

    #[tokio::test]
    async fn history_tail_respects_max() {
        let memory = ConversationMemory::new(10, 24);
        for i in 0..5 {
            memory
                .add_message("c1", StoredMessage::new(Role::User, format!("m{i}")))
                .await;
        }
        let tail = memory.get_history("c1", Some(2)).await;
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "m3");
        assert_eq!(tail[1].content, "m4");
    }

    #[tokio::test]
    async fn context_summary_renders_role_labels() {
        let memory = ConversationMemory::default();
        assert_eq!(
            memory.context_summary("missing").await,
            "No previous conversation history."
        );

        memory
            .add_message("c1", StoredMessage::new(Role::User, "need a ticket"))
            .await;
        memory
            .add_message("c1", StoredMessage::new(Role::Agent, "ticket created"))
            .await;

        let summary = memory.context_summary("c1").await;
        assert!(summary.starts_with("Previous conversation:"));
        assert!(summary.contains("User: need a ticket"));
        assert!(summary.contains("Agent: ticket created"));
    }

    #[tokio::test]
    async fn cleanup_drops_stale_conversations() {
        let memory = ConversationMemory::new(10, 24);
        memory
            .add_message("fresh", StoredMessage::new(Role::User, "hi"))
            .await;
        {
            let mut conversations = memory.conversations.lock().unwrap();
            let state = conversations.get_mut("fresh").unwrap();
            state.last_updated = Utc::now() - Duration::hours(48);
        }
        memory
            .add_message("active", StoredMessage::new(Role::User, "hi"))
            .await;

        assert_eq!(memory.cleanup_old(), 1);
        assert_eq!(memory.conversation_count(), 1);
        assert_eq!(memory.message_count("active"), 1);
    }

    #[tokio::test]
    async fn clear_conversation_removes_history() {
        let memory = ConversationMemory::default();
        memory
            .add_message("c1", StoredMessage::new(Role::User, "hi"))
            .await;
        memory.clear_conversation("c1");
        assert!(memory.get_history("c1", None).await.is_empty());
    }
}
