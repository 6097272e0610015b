//! Audit logging — structured security event logging.
//!
//! Events are appended to a per-day JSONL file (`audit_YYYYMMDD.jsonl`)
//! under a single writer lock, and optionally mirrored to an [`AuditStore`].
//! Audit failures never break the request path: write errors are swallowed
//! and reported through `tracing`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// A single audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: chrono::DateTime<Utc>,
    pub event_type: String,
    pub severity: AuditSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub details: serde_json::Value,
}

/// Repository mirror for audit events (the `AuditRepository` contract).
pub trait AuditStore: Send + Sync {
    fn append(&self, event: &AuditEvent);
}

/// Append-only audit log writing daily JSONL files.
pub struct AuditLog {
    dir: PathBuf,
    writer: Mutex<()>,
    store: Option<Box<dyn AuditStore>>,
}

impl AuditLog {
    /// Create an audit log rooted at `dir`. The directory is created eagerly;
    /// failure to create it is tolerated (writes will then be tracing-only).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to create audit directory");
        }
        Self {
            dir,
            writer: Mutex::new(()),
            store: None,
        }
    }

    /// Attach a repository mirror.
    pub fn with_store(mut self, store: Box<dyn AuditStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Record an event. Never fails.
    pub fn record(
        &self,
        event_type: impl Into<String>,
        severity: AuditSeverity,
        user_id: Option<&str>,
        details: serde_json::Value,
    ) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            event_type: event_type.into(),
            severity,
            user_id: user_id.map(String::from),
            details,
        };

        {
            let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = self.append_line(&event) {
                tracing::warn!(error = %e, event_type = %event.event_type, "Failed to write audit log");
            }
        }

        if let Some(store) = &self.store {
            store.append(&event);
        }

        tracing::debug!(
            event_type = %event.event_type,
            severity = ?event.severity,
            user_id = ?event.user_id,
            "AUDIT"
        );
    }

    fn append_line(&self, event: &AuditEvent) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_file())?;
        let line = serde_json::to_string(event).map_err(std::io::Error::other)?;
        writeln!(file, "{line}")
    }

    fn current_file(&self) -> PathBuf {
        self.file_for(&Utc::now().format("%Y%m%d").to_string())
    }

    fn file_for(&self, date: &str) -> PathBuf {
        self.dir.join(format!("audit_{date}.jsonl"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read the most recent events from today's file, newest last.
    pub fn recent(
        &self,
        limit: usize,
        severity: Option<AuditSeverity>,
        event_type: Option<&str>,
    ) -> Vec<AuditEvent> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let Ok(content) = std::fs::read_to_string(self.current_file()) else {
            return Vec::new();
        };
        let mut events: Vec<AuditEvent> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .filter(|e: &AuditEvent| severity.is_none_or(|s| e.severity == s))
            .filter(|e| event_type.is_none_or(|t| e.event_type == t))
            .collect();
        if events.len() > limit {
            events.drain(..events.len() - limit);
        }
        events
    }

    // --- convenience kinds ---

    pub fn blocked_content(&self, content: &str, user_id: Option<&str>) {
        self.record(
            "blocked_content",
            AuditSeverity::Warning,
            user_id,
            serde_json::json!({
                "content_preview": preview(content),
                "content_length": content.len(),
            }),
        );
    }

    pub fn pii_detected(&self, pii_types: &[String], user_id: Option<&str>) {
        self.record(
            "pii_detected",
            AuditSeverity::Info,
            user_id,
            serde_json::json!({ "pii_types": pii_types }),
        );
    }

    pub fn security_event(&self, kind: &str, content: &str, user_id: Option<&str>) {
        self.record(
            format!("security_{kind}"),
            AuditSeverity::Critical,
            user_id,
            serde_json::json!({
                "content_preview": preview(content),
                "content_length": content.len(),
            }),
        );
    }

    pub fn tool_execution(
        &self,
        tool: &str,
        parameters: serde_json::Value,
        result: &str,
        user_id: Option<&str>,
        success: bool,
    ) {
        self.record(
            "tool_execution",
            if success {
                AuditSeverity::Info
            } else {
                AuditSeverity::Error
            },
            user_id,
            serde_json::json!({
                "tool": tool,
                "parameters": parameters,
                "result_preview": preview(result),
                "success": success,
            }),
        );
    }

    pub fn rate_limit_exceeded(&self, user_id: &str, limit_type: &str) {
        self.record(
            "rate_limit_exceeded",
            AuditSeverity::Warning,
            Some(user_id),
            serde_json::json!({ "limit_type": limit_type }),
        );
    }

    pub fn authentication(&self, outcome: &str, detail: &str, severity: AuditSeverity) {
        self.record(
            "authentication",
            severity,
            None,
            serde_json::json!({ "outcome": outcome, "detail": detail }),
        );
    }

    pub fn data_access(&self, resource: &str, action: &str, user_id: Option<&str>) {
        self.record(
            "data_access",
            AuditSeverity::Info,
            user_id,
            serde_json::json!({ "resource": resource, "action": action }),
        );
    }

    pub fn circuit_breaker(&self, name: &str, state: &str) {
        self.record(
            "circuit_breaker",
            AuditSeverity::Warning,
            None,
            serde_json::json!({ "breaker": name, "state": state }),
        );
    }

    pub fn compliance(&self, check: &str, passed: bool, user_id: Option<&str>) {
        self.record(
            "compliance",
            if passed {
                AuditSeverity::Info
            } else {
                AuditSeverity::Warning
            },
            user_id,
            serde_json::json!({ "check": check, "passed": passed }),
        );
    }
}

fn preview(content: &str) -> String {
    content.chars().take(100).collect()
}
