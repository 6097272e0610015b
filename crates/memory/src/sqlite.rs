//! SQLite conversation store.
//!
//! A single database file with two tables: `conversations` for metadata and
//! `messages` for the append-only log. Pass `sqlite::memory:` for an
//! ephemeral in-process database (useful for tests).

use crate::ConversationStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use switchyard_core::{MemoryError, Role, StoredMessage};
use tracing::info;
use uuid::Uuid;

/// SQLite-backed conversation persistence.
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// Open (or create) the database at `url` and run migrations.
    pub async fn new(url: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(url, "SQLite conversation store initialized");
        Ok(store)
    }

    /// Build from an existing pool (shared with the auth store).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id         TEXT PRIMARY KEY,
                title      TEXT NOT NULL,
                intent     TEXT,
                status     TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                intent          TEXT,
                model_used      TEXT,
                cost            REAL,
                metadata        TEXT NOT NULL DEFAULT '{}',
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
             ON messages(conversation_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("messages index: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create_conversation(
        &self,
        id: &str,
        title: &str,
        intent: Option<&str>,
    ) -> Result<(), MemoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO conversations (id, title, intent, status, created_at, updated_at)
             VALUES (?, ?, ?, 'active', ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(title)
        .bind(intent)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("create conversation: {e}")))?;
        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: &StoredMessage,
    ) -> Result<(), MemoryError> {
        let metadata = serde_json::to_string(&message.metadata)
            .map_err(|e| MemoryError::Storage(format!("metadata encode: {e}")))?;

        sqlx::query(
            "INSERT INTO messages
                (id, conversation_id, role, content, intent, model_used, cost, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(conversation_id)
        .bind(role_str(message.role))
        .bind(&message.content)
        .bind(&message.intent)
        .bind(&message.model_used)
        .bind(message.cost)
        .bind(&metadata)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("append message: {e}")))?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("touch conversation: {e}")))?;

        Ok(())
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, MemoryError> {
        let rows = sqlx::query(
            "SELECT role, content, intent, model_used, cost, metadata, created_at
             FROM messages
             WHERE conversation_id = ?
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("recent messages: {e}")))?;

        let mut messages: Vec<StoredMessage> = rows
            .iter()
            .map(|row| {
                let metadata: String = row.get("metadata");
                let created_at: String = row.get("created_at");
                StoredMessage {
                    role: parse_role(&row.get::<String, _>("role")),
                    content: row.get("content"),
                    intent: row.get("intent"),
                    model_used: row.get("model_used"),
                    cost: row.get("cost"),
                    metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                    timestamp: DateTime::parse_from_rfc3339(&created_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                }
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Agent => "agent",
        Role::System => "system",
    }
}

fn parse_role(s: &str) -> Role {
    match s {
        "agent" => Role::Agent,
        "system" => Role::System,
        _ => Role::User,
    }
}
