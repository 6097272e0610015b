//! Tiered intent classification.
//!
//! Classification runs through three tiers, cheapest first:
//!
//! 1. **Cache** — a TTL cache keyed by a hash of the normalized text.
//! 2. **Deterministic** — two ordered phrase tables with confidence scores
//!    (strong phrases 0.95, weak keywords 0.60, no match 0.30). A result at
//!    or above the confidence threshold is final.
//! 3. **LLM** — a small/cheap model with a minimal prompt; errors fall back
//!    to the deterministic result.
//!
//! Every terminal classification is written back to the cache, so repeated
//! text never pays for the LLM twice within the TTL.

pub mod cache;

use serde::Serialize;
use std::sync::{Arc, Mutex};
use switchyard_core::Intent;
use switchyard_providers::{CompletionModel, SelectedModel};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

pub use cache::IntentCache;

/// Strong phrases (confidence 0.95), in intent precedence order.
const STRONG_PATTERNS: &[(Intent, &[&str])] = &[
    (
        Intent::Tickets,
        &[
            "create ticket",
            "new ticket",
            "open ticket",
            "support ticket",
            "report issue",
            "report bug",
            "file ticket",
        ],
    ),
    (
        Intent::Account,
        &[
            "my account",
            "account settings",
            "profile settings",
            "update profile",
            "change password",
            "account info",
        ],
    ),
    (
        Intent::Payments,
        &[
            "make payment",
            "process payment",
            "pay bill",
            "payment method",
            "billing info",
            "invoice",
        ],
    ),
    (
        Intent::General,
        &[
            "hello",
            "hi there",
            "good morning",
            "good afternoon",
            "thank you",
            "thanks",
            "goodbye",
            "bye",
        ],
    ),
];

/// Weak keywords (confidence 0.60), in intent precedence order.
const WEAK_KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::Tickets,
        &["ticket", "issue", "problem", "bug", "error", "support"],
    ),
    (Intent::Account, &["account", "profile", "user", "settings"]),
    (
        Intent::Payments,
        &["payment", "pay", "billing", "charge", "bill"],
    ),
    (
        Intent::General,
        &["help", "what can you do", "who are you"],
    ),
];

const STRONG_CONFIDENCE: f32 = 0.95;
const WEAK_CONFIDENCE: f32 = 0.60;
const NO_MATCH_CONFIDENCE: f32 = 0.30;

/// Deterministic match with confidence. Strong beats weak; within a table,
/// first match in precedence order wins.
pub fn classify_deterministic(text: &str) -> (Intent, f32) {
    let text = text.trim().to_lowercase();

    for (intent, phrases) in STRONG_PATTERNS {
        if phrases.iter().any(|p| text.contains(p)) {
            return (*intent, STRONG_CONFIDENCE);
        }
    }

    for (intent, keywords) in WEAK_KEYWORDS {
        if keywords.iter().any(|k| text.contains(k)) {
            return (*intent, WEAK_CONFIDENCE);
        }
    }

    (Intent::Unknown, NO_MATCH_CONFIDENCE)
}

/// Classifier tunables.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub use_llm: bool,
    pub confidence_threshold: f32,
    pub cache_ttl_secs: u64,
    pub enable_cache: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            use_llm: true,
            confidence_threshold: 0.8,
            cache_ttl_secs: 3600,
            enable_cache: true,
        }
    }
}

/// Outcome of one classification, carrying the metadata the router records
/// with the agent turn.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub intent: Intent,
    pub used_llm: bool,
    pub provider: String,
}

/// Tier counters for monitoring.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ClassifierMetrics {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub deterministic_high_confidence: u64,
    pub deterministic_low_confidence: u64,
    pub llm_calls: u64,
}

/// A progress or terminal event from the streaming classifier.
#[derive(Debug, Clone)]
pub enum ClassifyEvent {
    Progress(String),
    Complete { message: String, intent: Intent },
}

/// The tiered classifier.
pub struct IntentClassifier {
    config: ClassifierConfig,
    cache: Option<IntentCache>,
    model: Option<Arc<dyn CompletionModel>>,
    provider: Option<String>,
    metrics: Mutex<ClassifierMetrics>,
}

impl IntentClassifier {
    /// Build a classifier. `selected` is the outcome of provider selection;
    /// `None` downgrades the LLM tier silently.
    pub fn new(config: ClassifierConfig, selected: Option<SelectedModel>) -> Self {
        let (model, provider) = match selected {
            Some(s) if config.use_llm => (Some(s.model), Some(s.provider)),
            _ => (None, None),
        };
        if config.use_llm && model.is_none() {
            warn!("No LLM provider available, falling back to deterministic matching");
        }

        let cache = config
            .enable_cache
            .then(|| IntentCache::new(config.cache_ttl_secs));

        Self {
            config,
            cache,
            model,
            provider,
            metrics: Mutex::new(ClassifierMetrics::default()),
        }
    }

    /// Deterministic-only classifier (tests, LLM disabled deployments).
    pub fn deterministic_only() -> Self {
        Self::new(
            ClassifierConfig {
                use_llm: false,
                ..ClassifierConfig::default()
            },
            None,
        )
    }

    /// Whether the LLM tier is live.
    pub fn llm_enabled(&self) -> bool {
        self.model.is_some()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn metrics(&self) -> ClassifierMetrics {
        *self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Classify user text through the tiers.
    pub async fn classify(&self, text: &str) -> Classification {
        self.bump(|m| m.total_requests += 1);

        if text.trim().is_empty() {
            return self.deterministic_result(Intent::Unknown);
        }

        if let Some(cache) = &self.cache {
            if let Some(intent) = cache.get(text) {
                self.bump(|m| m.cache_hits += 1);
                debug!(%intent, "Intent cache hit");
                return Classification {
                    intent,
                    used_llm: false,
                    provider: "cache".into(),
                };
            }
        }

        let (intent, confidence) = classify_deterministic(text);
        if confidence >= self.config.confidence_threshold {
            self.bump(|m| m.deterministic_high_confidence += 1);
            self.cache_set(text, intent);
            return self.deterministic_result(intent);
        }

        self.bump(|m| m.deterministic_low_confidence += 1);

        if let Some(model) = &self.model {
            self.bump(|m| m.llm_calls += 1);
            match model.complete(&llm_prompt(text)).await {
                Ok(response) => {
                    let llm_intent = parse_llm_intent(&response);
                    self.cache_set(text, llm_intent);
                    return Classification {
                        intent: llm_intent,
                        used_llm: true,
                        provider: self
                            .provider
                            .clone()
                            .unwrap_or_else(|| model.name().to_string()),
                    };
                }
                Err(e) => {
                    warn!(error = %e, "LLM classification failed, using deterministic result");
                }
            }
        }

        self.cache_set(text, intent);
        self.deterministic_result(intent)
    }

    /// Streaming variant: progress messages, then exactly one terminal event.
    pub fn classify_streaming(self: &Arc<Self>, text: String) -> ReceiverStream<ClassifyEvent> {
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let classifier = Arc::clone(self);

        tokio::spawn(async move {
            if text.trim().is_empty() {
                let _ = tx
                    .send(ClassifyEvent::Complete {
                        message: "Classification complete".into(),
                        intent: Intent::Unknown,
                    })
                    .await;
                return;
            }

            let _ = tx
                .send(ClassifyEvent::Progress("🤔 Analyzing your request...".into()))
                .await;
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;

            if let Some(provider) = classifier.provider_name() {
                let _ = tx
                    .send(ClassifyEvent::Progress(format!(
                        "🧠 Using {} for classification...",
                        provider.to_uppercase()
                    )))
                    .await;
            } else {
                let _ = tx
                    .send(ClassifyEvent::Progress("📋 Using keyword matching...".into()))
                    .await;
            }

            let classification = classifier.classify(&text).await;
            let _ = tx
                .send(ClassifyEvent::Complete {
                    message: format!("✓ Intent identified: {}", classification.intent),
                    intent: classification.intent,
                })
                .await;
        });

        ReceiverStream::new(rx)
    }

    fn deterministic_result(&self, intent: Intent) -> Classification {
        Classification {
            intent,
            used_llm: false,
            provider: "deterministic".into(),
        }
    }

    fn cache_set(&self, text: &str, intent: Intent) {
        if let Some(cache) = &self.cache {
            cache.set(text, intent);
        }
    }

    fn bump(&self, f: impl FnOnce(&mut ClassifierMetrics)) {
        f(&mut self.metrics.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

/// Minimal prompt tuned for small models.
fn llm_prompt(text: &str) -> String {
    format!(
        r#"Classify this message into ONE intent:
- tickets: support tickets, issues, bugs
- account: account info, profile, settings
- payments: payment requests, billing
- general: greetings, thanks, help
- unknown: anything else

Message: "{text}"
Intent:"#
    )
}

/// Substring match for intent names, precedence order, `unknown` fallback.
fn parse_llm_intent(response: &str) -> Intent {
    let response = response.trim().to_lowercase();
    for intent in [
        Intent::Tickets,
        Intent::Account,
        Intent::Payments,
        Intent::General,
    ] {
        if response.contains(intent.as_str()) {
            return intent;
        }
    }
    Intent::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use switchyard_core::ProviderError;
    use tokio_stream::StreamExt;

    struct FixedModel {
        response: String,
        calls: AtomicU32,
    }

    #[async_trait]
    impl CompletionModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl CompletionModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Network("unreachable".into()))
        }
    }

    fn with_model(model: Arc<dyn CompletionModel>, provider: &str) -> IntentClassifier {
        IntentClassifier::new(
            ClassifierConfig::default(),
            Some(SelectedModel {
                model,
                provider: provider.into(),
            }),
        )
    }

    #[test]
    fn strong_phrases_win_with_high_confidence() {
        assert_eq!(
            classify_deterministic("Please create ticket for me"),
            (Intent::Tickets, 0.95)
        );
        assert_eq!(
            classify_deterministic("what is my account status"),
            (Intent::Account, 0.95)
        );
        assert_eq!(classify_deterministic("hello!"), (Intent::General, 0.95));
    }

    #[test]
    fn strong_precedence_is_tickets_first() {
        // Matches both a tickets strong phrase and a payments strong phrase
        let (intent, confidence) = classify_deterministic("create ticket about my invoice");
        assert_eq!(intent, Intent::Tickets);
        assert_eq!(confidence, 0.95);
    }

    #[test]
    fn weak_keywords_score_low() {
        assert_eq!(classify_deterministic("billing question"), (Intent::Payments, 0.6));
        assert_eq!(classify_deterministic("weird error happened"), (Intent::Tickets, 0.6));
    }

    #[test]
    fn no_match_is_unknown() {
        assert_eq!(
            classify_deterministic("the quick brown fox"),
            (Intent::Unknown, 0.3)
        );
    }

    #[tokio::test]
    async fn high_confidence_skips_llm() {
        let model = Arc::new(FixedModel {
            response: "payments".into(),
            calls: AtomicU32::new(0),
        });
        let classifier = with_model(model.clone(), "fixed");

        let result = classifier.classify("create ticket now").await;
        assert_eq!(result.intent, Intent::Tickets);
        assert!(!result.used_llm);
        assert_eq!(result.provider, "deterministic");
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn low_confidence_invokes_llm_once_then_caches() {
        let model = Arc::new(FixedModel {
            response: "Intent: account".into(),
            calls: AtomicU32::new(0),
        });
        let classifier = with_model(model.clone(), "fixed");

        let first = classifier.classify("tell me about xyzzy").await;
        assert_eq!(first.intent, Intent::Account);
        assert!(first.used_llm);
        assert_eq!(first.provider, "fixed");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        // Same text within TTL: served from cache, no second LLM call
        let second = classifier.classify("tell me about xyzzy").await;
        assert_eq!(second.intent, Intent::Account);
        assert!(!second.used_llm);
        assert_eq!(second.provider, "cache");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        let metrics = classifier.metrics();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.llm_calls, 1);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_deterministic() {
        let classifier = with_model(Arc::new(FailingModel), "failing");
        let result = classifier.classify("billing question please").await;
        // Weak keyword "billing" → payments at 0.6, below threshold, LLM fails
        assert_eq!(result.intent, Intent::Payments);
        assert!(!result.used_llm);
        assert_eq!(result.provider, "deterministic");
    }

    #[tokio::test]
    async fn empty_text_is_unknown_without_caching() {
        let classifier = IntentClassifier::deterministic_only();
        let result = classifier.classify("   ").await;
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(classifier.metrics().cache_hits, 0);
    }

    #[tokio::test]
    async fn unparseable_llm_response_is_unknown() {
        assert_eq!(parse_llm_intent("I have no idea"), Intent::Unknown);
        assert_eq!(parse_llm_intent("Intent: TICKETS"), Intent::Tickets);
    }

    #[tokio::test]
    async fn streaming_yields_progress_then_single_terminal() {
        let classifier = Arc::new(IntentClassifier::deterministic_only());
        let mut stream = classifier.classify_streaming("create ticket".into());

        let mut progress = 0;
        let mut terminal = None;
        while let Some(event) = stream.next().await {
            match event {
                ClassifyEvent::Progress(_) => progress += 1,
                ClassifyEvent::Complete { intent, message } => {
                    assert!(message.contains("tickets"));
                    terminal = Some(intent);
                }
            }
        }
        assert!(progress >= 1);
        assert_eq!(terminal, Some(Intent::Tickets));
    }
}
