//! Sliding-window rate limiting.
//!
//! Two limiters live here:
//! - [`SlidingWindowLimiter`] counts per-identity requests across minute,
//!   hour, and day windows. Used by the guardrail input pipeline.
//! - [`ApiKeyRateLimiter`] is the per-key minute limiter called from the
//!   gateway middleware. The limit is passed per call so a key's
//!   `custom_rate_limit` can override the organization default.
//!
//! Both record a request only when it is admitted, so rejected calls never
//! consume quota. Cleanup is lazy on access; entries older than 24 h are
//! dropped whenever an identity is touched.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

const MINUTE: i64 = 60;
const HOUR: i64 = 3600;
const DAY: i64 = 86_400;

/// Remaining quota per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemainingQuota {
    pub minute: u32,
    pub hour: u32,
    pub day: u32,
}

/// Earliest reset instant per window (`None` when the identity has no history).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResetTimes {
    pub minute: Option<DateTime<Utc>>,
    pub hour: Option<DateTime<Utc>>,
    pub day: Option<DateTime<Utc>>,
}

/// Aggregate limiter statistics for observability.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterStats {
    pub total_identities: usize,
    pub total_requests_tracked: usize,
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

/// Multi-window sliding limiter keyed by identity (API-key id or IP).
pub struct SlidingWindowLimiter {
    per_minute: u32,
    per_hour: u32,
    per_day: u32,
    history: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl SlidingWindowLimiter {
    pub fn new(per_minute: u32, per_hour: u32, per_day: u32) -> Self {
        Self {
            per_minute,
            per_hour,
            per_day,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Check the identity against all windows and record the request if
    /// admitted. Rejects exactly when any window count equals its limit.
    pub fn check(&self, identity: &str) -> bool {
        let now = Utc::now();
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());

        let timestamps = history.entry(identity.to_string()).or_default();
        prune(timestamps, now);

        let allowed = count_window(timestamps, now, MINUTE) < self.per_minute as usize
            && count_window(timestamps, now, HOUR) < self.per_hour as usize
            && count_window(timestamps, now, DAY) < self.per_day as usize;

        if allowed {
            timestamps.push(now);
        } else if timestamps.is_empty() {
            history.remove(identity);
        }
        allowed
    }

    /// Per-window remaining counts. A fresh identity gets the full quota.
    pub fn remaining(&self, identity: &str) -> RemainingQuota {
        let now = Utc::now();
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let timestamps = history.get(identity).map(Vec::as_slice).unwrap_or(&[]);

        RemainingQuota {
            minute: self
                .per_minute
                .saturating_sub(count_window(timestamps, now, MINUTE) as u32),
            hour: self
                .per_hour
                .saturating_sub(count_window(timestamps, now, HOUR) as u32),
            day: self
                .per_day
                .saturating_sub(count_window(timestamps, now, DAY) as u32),
        }
    }

    /// Earliest reset instant per window: oldest kept timestamp + window.
    pub fn reset_at(&self, identity: &str) -> ResetTimes {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let oldest = history
            .get(identity)
            .and_then(|ts| ts.iter().min())
            .copied();

        ResetTimes {
            minute: oldest.map(|t| t + Duration::seconds(MINUTE)),
            hour: oldest.map(|t| t + Duration::seconds(HOUR)),
            day: oldest.map(|t| t + Duration::seconds(DAY)),
        }
    }

    /// Drop all history for an identity (admin operation).
    pub fn reset_identity(&self, identity: &str) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(identity);
    }

    pub fn stats(&self) -> LimiterStats {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        LimiterStats {
            total_identities: history.len(),
            total_requests_tracked: history.values().map(Vec::len).sum(),
            per_minute: self.per_minute,
            per_hour: self.per_hour,
            per_day: self.per_day,
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(10, 100, 1000)
    }
}

/// Per-key request state returned to the middleware for response headers.
#[derive(Debug, Clone, Serialize)]
pub struct RateInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Option<DateTime<Utc>>,
}

/// Minute-window limiter keyed by API-key id, with a dynamic per-call limit.
#[derive(Default)]
pub struct ApiKeyRateLimiter {
    history: Mutex<HashMap<Uuid, Vec<DateTime<Utc>>>>,
}

impl ApiKeyRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and, if admitted, record a request for the key.
    pub fn check(&self, key_id: Uuid, limit: u32) -> (bool, RateInfo) {
        let now = Utc::now();
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let timestamps = history.entry(key_id).or_default();
        prune(timestamps, now);

        let count = count_window(timestamps, now, MINUTE);
        let reset_at = timestamps
            .iter()
            .min()
            .map(|t| *t + Duration::seconds(MINUTE));

        if count >= limit as usize {
            return (
                false,
                RateInfo {
                    limit,
                    remaining: 0,
                    reset_at,
                },
            );
        }

        timestamps.push(now);
        let remaining = limit.saturating_sub(count as u32 + 1);
        let reset_at = timestamps
            .iter()
            .min()
            .map(|t| *t + Duration::seconds(MINUTE));
        (
            true,
            RateInfo {
                limit,
                remaining,
                reset_at,
            },
        )
    }

    /// Drop all history for a key (test isolation and admin resets).
    pub fn reset_key(&self, key_id: Uuid) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key_id);
    }
}

/// Drop timestamps older than 24 h.
fn prune(timestamps: &mut Vec<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = now - Duration::seconds(DAY);
    timestamps.retain(|t| *t > cutoff);
}

/// Count entries inside the trailing window. Entries in the future relative
/// to `now` (clock regression) are treated as outside the window.
fn count_window(timestamps: &[DateTime<Utc>], now: DateTime<Utc>, window_secs: i64) -> usize {
    let cutoff = now - Duration::seconds(window_secs);
    timestamps
        .iter()
        .filter(|t| **t > cutoff && **t <= now)
        .count()
}
