//! Circuit breakers for remote upstreams.
//!
//! Standard three-state machine per named upstream:
//! Closed → Open after `failure_threshold` consecutive failures;
//! Open → Half-Open once `timeout` has elapsed since the last failure;
//! Half-Open → Closed after `success_threshold` consecutive probe successes,
//! back to Open on any probe failure.
//!
//! The state lock is never held across the wrapped call. Half-open probes are
//! serialized with a `probe_in_flight` flag: a second caller arriving during
//! a probe is rejected as if the breaker were open.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use switchyard_core::AgentError;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, requests allowed
    Closed,
    /// Failing, requests blocked
    Open,
    /// Testing whether the upstream recovered
    HalfOpen,
}

/// Tunables for one breaker.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Seconds to wait in Open before allowing a probe
    pub timeout_secs: i64,
    /// Consecutive half-open successes needed to close
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_secs: 60,
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<DateTime<Utc>>,
    last_state_change: DateTime<Utc>,
    probe_in_flight: bool,
}

/// Observability snapshot of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_secs: i64,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
    pub time_in_state_secs: i64,
}

/// A circuit breaker guarding one named upstream.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                last_state_change: Utc::now(),
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute `f` with breaker protection.
    ///
    /// In Open state this fails fast with [`AgentError::BreakerOpen`] without
    /// invoking `f`. In Half-Open, only one probe runs at a time.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, AgentError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let probing = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            match inner.state {
                CircuitState::Open => {
                    if self.should_attempt_reset(&inner) {
                        Self::transition(&mut inner, CircuitState::HalfOpen);
                        inner.probe_in_flight = true;
                        true
                    } else {
                        return Err(AgentError::BreakerOpen(self.name.clone()));
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.probe_in_flight {
                        return Err(AgentError::BreakerOpen(self.name.clone()));
                    }
                    inner.probe_in_flight = true;
                    true
                }
                CircuitState::Closed => false,
            }
        };

        let result = f().await;

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if probing {
            inner.probe_in_flight = false;
            match &result {
                Ok(_) => {
                    inner.success_count += 1;
                    if inner.success_count >= self.config.success_threshold {
                        Self::transition(&mut inner, CircuitState::Closed);
                        tracing::info!(breaker = %self.name, "Circuit breaker closed after recovery");
                    }
                }
                Err(_) => {
                    inner.failure_count += 1;
                    inner.last_failure = Some(Utc::now());
                    Self::transition(&mut inner, CircuitState::Open);
                    tracing::warn!(breaker = %self.name, "Half-open probe failed, reopening");
                }
            }
        } else {
            match &result {
                Ok(_) => inner.failure_count = 0,
                Err(_) => {
                    inner.failure_count += 1;
                    inner.last_failure = Some(Utc::now());
                    if inner.failure_count >= self.config.failure_threshold
                        && inner.state == CircuitState::Closed
                    {
                        Self::transition(&mut inner, CircuitState::Open);
                        tracing::warn!(
                            breaker = %self.name,
                            failures = inner.failure_count,
                            "Circuit breaker opened"
                        );
                    }
                }
            }
        }

        result
    }

    fn should_attempt_reset(&self, inner: &BreakerInner) -> bool {
        match inner.last_failure {
            Some(last) => (Utc::now() - last).num_seconds() >= self.config.timeout_secs,
            None => true,
        }
    }

    fn transition(inner: &mut BreakerInner, to: CircuitState) {
        inner.state = to;
        inner.last_state_change = Utc::now();
        match to {
            CircuitState::Closed => {
                inner.failure_count = 0;
                inner.success_count = 0;
            }
            CircuitState::Open => {
                inner.success_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.failure_count = 0;
                inner.success_count = 0;
            }
        }
    }

    /// Manually reset to Closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Self::transition(&mut inner, CircuitState::Closed);
        inner.last_failure = None;
        inner.probe_in_flight = false;
    }

    /// Manually force Open.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Self::transition(&mut inner, CircuitState::Open);
        inner.last_failure = Some(Utc::now());
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            timeout_secs: self.config.timeout_secs,
            last_failure: inner.last_failure,
            last_state_change: inner.last_state_change,
            time_in_state_secs: (Utc::now() - inner.last_state_change).num_seconds(),
        }
    }
}

/// Centralized registry of breakers, one per upstream name.
#[derive(Default)]
pub struct BreakerManager {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a breaker. The config only applies on first creation.
    pub fn get(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    pub fn reset_all(&self) {
        let breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        for breaker in breakers.values() {
            breaker.reset();
        }
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers.values().map(|b| b.snapshot()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        let breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            timeout_secs: 60,
            success_threshold: 2,
        }
    }

    async fn ok_call(breaker: &CircuitBreaker) -> Result<&'static str, AgentError> {
        breaker.call(|| async { Ok("ok") }).await
    }

    async fn failing_call(breaker: &CircuitBreaker) -> Result<&'static str, AgentError> {
        breaker
            .call(|| async { Err(AgentError::Network("down".into())) })
            .await
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new("svc", fast_config());
        for _ in 0..3 {
            assert!(failing_call(&breaker).await.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // Open: fails fast without invoking the function
        let invoked = std::sync::atomic::AtomicBool::new(false);
        let result: Result<(), AgentError> = breaker
            .call(|| {
                invoked.store(true, std::sync::atomic::Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(AgentError::BreakerOpen(name)) if name == "svc"));
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn success_in_closed_resets_failure_count() {
        let breaker = CircuitBreaker::new("svc", fast_config());
        assert!(failing_call(&breaker).await.is_err());
        assert!(failing_call(&breaker).await.is_err());
        assert!(ok_call(&breaker).await.is_ok());
        // Two more failures do not trip the threshold of 3
        assert!(failing_call(&breaker).await.is_err());
        assert!(failing_call(&breaker).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new("svc", BreakerConfig {
            timeout_secs: 0,
            ..fast_config()
        });
        for _ in 0..3 {
            let _ = failing_call(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // timeout_secs = 0 → next call probes immediately
        assert!(ok_call(&breaker).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(ok_call(&breaker).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("svc", BreakerConfig {
            timeout_secs: 0,
            ..fast_config()
        });
        for _ in 0..3 {
            let _ = failing_call(&breaker).await;
        }
        assert!(failing_call(&breaker).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn manual_reset_and_force_open() {
        let breaker = CircuitBreaker::new("svc", fast_config());
        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(ok_call(&breaker).await.is_ok());
    }

    #[tokio::test]
    async fn snapshot_reports_counters() {
        let breaker = CircuitBreaker::new("svc", fast_config());
        let _ = failing_call(&breaker).await;
        let snap = breaker.snapshot();
        assert_eq!(snap.name, "svc");
        assert_eq!(snap.failure_count, 1);
        assert_eq!(snap.state, CircuitState::Closed);
        assert!(snap.last_failure.is_some());
    }

    #[tokio::test]
    async fn manager_reuses_breakers_by_name() {
        let manager = BreakerManager::new();
        let a = manager.get("x", BreakerConfig::default());
        let b = manager.get("x", BreakerConfig::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.names(), vec!["x".to_string()]);

        a.force_open();
        manager.reset_all();
        assert_eq!(a.state(), CircuitState::Closed);
    }
}
