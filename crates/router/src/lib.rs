//! The principal router — one request from text extraction to response.
//!
//! Pipeline per turn: extract text parts → persist the user turn → read the
//! history tail → input guardrail → delegation heuristic → intent
//! classification → dispatch (local handler or remote agent) → output
//! guardrail + PII redaction → persist the agent turn → emit one response
//! message (or a paced stream of parts).
//!
//! Failure semantics: guardrail rejections and handler errors become
//! user-visible `❌ …` messages, never transport failures. A principal
//! request is an orchestration outcome, so HTTP still sees success.

pub mod handlers;
pub mod streaming;

use handlers::{
    AccountHandler, GeneralHandler, HandlerContext, PaymentsHandler, TaskHandler, TicketsHandler,
};
use std::collections::HashMap;
use std::sync::Arc;
use streaming::{StreamingConfig, chunk_text};
use switchyard_core::{A2aMessage, AgentCard, Intent, Part, Role, StoredMessage};
use switchyard_intent::{ClassifyEvent, IntentClassifier};
use switchyard_memory::ConversationMemory;
use switchyard_mesh::{AgentRegistry, ClientPool};
use switchyard_security::breaker::BreakerConfig;
use switchyard_security::{BreakerManager, Guardrails};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

/// Phrases that mark a request as a delegation to a named agent.
const DELEGATION_KEYWORDS: &[&str] = &[
    "ask the",
    "check with",
    "consult",
    "delegate to",
    "get help from",
    "forward to",
    "send to",
    "talk to",
];

const HELP_TEXT: &str = "I'm not sure how to help with that. Try asking about tickets, \
                         account, payments, insurance, weather, or general questions!";

/// Router tunables.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Whether delegation and external-agent routing are available.
    pub enable_a2a: bool,
    /// History tail passed to handlers.
    pub history_window: usize,
    pub streaming: StreamingConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enable_a2a: true,
            history_window: 5,
            streaming: StreamingConfig::default(),
        }
    }
}

/// One inbound request: the message plus an optional task id.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub message: A2aMessage,
    pub task_id: Option<String>,
}

impl RouteRequest {
    pub fn new(message: A2aMessage) -> Self {
        Self {
            message,
            task_id: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Conversation id: task id, falling back to message id, then "default".
    pub fn conversation_id(&self) -> String {
        self.task_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| {
                if self.message.message_id.is_empty() {
                    "default".into()
                } else {
                    self.message.message_id.clone()
                }
            })
    }
}

/// The principal router.
pub struct PrincipalRouter {
    config: RouterConfig,
    guardrails: Arc<Guardrails>,
    classifier: Arc<IntentClassifier>,
    memory: Arc<ConversationMemory>,
    registry: Arc<AgentRegistry>,
    pool: Arc<ClientPool>,
    breakers: Arc<BreakerManager>,
    handlers: HashMap<Intent, Arc<dyn TaskHandler>>,
}

impl PrincipalRouter {
    pub fn new(
        guardrails: Arc<Guardrails>,
        classifier: Arc<IntentClassifier>,
        memory: Arc<ConversationMemory>,
        registry: Arc<AgentRegistry>,
        pool: Arc<ClientPool>,
        breakers: Arc<BreakerManager>,
    ) -> Self {
        let mut handlers: HashMap<Intent, Arc<dyn TaskHandler>> = HashMap::new();
        handlers.insert(Intent::Tickets, Arc::new(TicketsHandler::new()));
        handlers.insert(Intent::Account, Arc::new(AccountHandler));
        handlers.insert(Intent::Payments, Arc::new(PaymentsHandler));
        handlers.insert(Intent::General, Arc::new(GeneralHandler));

        Self {
            config: RouterConfig::default(),
            guardrails,
            classifier,
            memory,
            registry,
            pool,
            breakers,
            handlers,
        }
    }

    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace a handler (tests and domain extensions).
    pub fn with_handler(mut self, intent: Intent, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(intent, handler);
        self
    }

    pub fn classifier(&self) -> &Arc<IntentClassifier> {
        &self.classifier
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    /// Process one request and produce the response message.
    pub async fn execute(&self, request: &RouteRequest) -> A2aMessage {
        let conversation_id = request.conversation_id();
        let text = request.message.text();

        self.memory
            .add_message(&conversation_id, StoredMessage::new(Role::User, text.as_str()))
            .await;

        let history = self
            .memory
            .get_history(&conversation_id, Some(self.config.history_window))
            .await;
        let ctx = HandlerContext::new(text.as_str(), history, conversation_id.as_str());

        if let Err(reason) = self
            .guardrails
            .validate_input(&text, Some(conversation_id.as_str()))
        {
            let result = format!("❌ {reason}");
            let mut metadata = serde_json::Map::new();
            metadata.insert("error".into(), serde_json::json!("validation_failed"));
            self.memory
                .add_message(
                    &conversation_id,
                    StoredMessage::new(Role::Agent, result.as_str()).with_metadata(metadata),
                )
                .await;
            return A2aMessage::agent(result);
        }

        let (result, intent_label, used_llm, provider) =
            if self.config.enable_a2a && self.should_delegate(&text) {
                let result = self
                    .delegate_to_agent(&text, request.task_id.as_deref())
                    .await;
                (result, "delegation".to_string(), false, "delegation".to_string())
            } else {
                let classification = self.classifier.classify(&text).await;
                let result = self
                    .dispatch(classification.intent, &text, &ctx, &conversation_id)
                    .await;
                (
                    result,
                    classification.intent.as_str().to_string(),
                    classification.used_llm,
                    classification.provider,
                )
            };

        let result = self.validate_and_sanitize(result);

        let metadata = classification_metadata(&intent_label, used_llm, &provider);
        self.memory
            .add_message(
                &conversation_id,
                StoredMessage::new(Role::Agent, result.as_str())
                    .with_metadata(metadata.clone())
                    .with_intent(intent_label.as_str()),
            )
            .await;

        info!(
            conversation = %conversation_id,
            intent = %intent_label,
            used_llm,
            provider = %provider,
            "Request routed"
        );

        A2aMessage::agent(result).with_metadata(serde_json::Value::Object(metadata))
    }

    /// Streaming variant: progress parts, an execution marker, then the final
    /// text delivered in paced word chunks.
    pub fn execute_streaming(self: &Arc<Self>, request: RouteRequest) -> ReceiverStream<Part> {
        let (tx, rx) = tokio::sync::mpsc::channel::<Part>(32);
        let router = Arc::clone(self);

        tokio::spawn(async move {
            let conversation_id = request.conversation_id();
            let text = request.message.text();

            router
                .memory
                .add_message(&conversation_id, StoredMessage::new(Role::User, text.as_str()))
                .await;
            let history = router
                .memory
                .get_history(&conversation_id, Some(router.config.history_window))
                .await;
            let ctx = HandlerContext::new(text.as_str(), history, conversation_id.as_str());

            if let Err(reason) = router
                .guardrails
                .validate_input(&text, Some(conversation_id.as_str()))
            {
                let _ = tx.send(Part::text(format!("❌ {reason}\n"))).await;
                return;
            }

            let mut intent = None;
            let mut classify_stream = router.classifier.classify_streaming(text.clone());
            while let Some(event) = classify_stream.next().await {
                match event {
                    ClassifyEvent::Progress(message) => {
                        let _ = tx.send(Part::text(format!("{message}\n"))).await;
                    }
                    ClassifyEvent::Complete {
                        message,
                        intent: classified,
                    } => {
                        let _ = tx.send(Part::text(format!("{message}\n"))).await;
                        intent = Some(classified);
                    }
                }
            }

            let Some(intent) = intent else {
                let _ = tx.send(Part::text("❌ Could not determine intent\n")).await;
                return;
            };

            let _ = tx
                .send(Part::text(format!("\n🔧 Executing {intent} task...\n")))
                .await;

            let result = router.dispatch(intent, &text, &ctx, &conversation_id).await;
            let result = router.validate_and_sanitize(result);

            let mut metadata = serde_json::Map::new();
            metadata.insert("intent".into(), serde_json::json!(intent.as_str()));
            router
                .memory
                .add_message(
                    &conversation_id,
                    StoredMessage::new(Role::Agent, result.as_str())
                        .with_metadata(metadata)
                        .with_intent(intent.as_str()),
                )
                .await;

            let _ = tx.send(Part::text("\n📋 Result:\n")).await;
            for chunk in chunk_text(&result, router.config.streaming.chunk_size) {
                if tx.send(Part::text(chunk)).await.is_err() {
                    return;
                }
                tokio::time::sleep(router.config.streaming.delay).await;
            }
        });

        ReceiverStream::new(rx)
    }

    /// `cancel` entry point; cancellation is not supported end-to-end.
    pub fn cancel(&self) -> A2aMessage {
        A2aMessage::agent("Cancel not supported in this version.")
    }

    // --- dispatch ---

    async fn dispatch(
        &self,
        intent: Intent,
        text: &str,
        ctx: &HandlerContext,
        conversation_id: &str,
    ) -> String {
        if intent.is_external() {
            return self
                .route_to_external_agent(intent, text, conversation_id)
                .await;
        }

        match self.handlers.get(&intent) {
            Some(handler) => match handler.invoke(ctx).await {
                Ok(result) => format!("{}: {result}", handler.display()),
                Err(e) => format!("❌ {e}"),
            },
            None => HELP_TEXT.into(),
        }
    }

    fn should_delegate(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        DELEGATION_KEYWORDS.iter().any(|k| text.contains(k))
    }

    fn extract_agent_name(&self, text: &str) -> Option<String> {
        let text = text.to_lowercase();
        self.registry
            .names()
            .into_iter()
            .find(|name| text.contains(&name.to_lowercase()))
    }

    fn extract_task(&self, text: &str, agent_name: &str) -> String {
        let mut task = text.to_lowercase();
        for keyword in DELEGATION_KEYWORDS {
            task = task.replace(&format!("{keyword} {agent_name}"), "");
        }
        task = task.replace("to ", "").replace("about ", "");
        let task = task.trim().to_string();
        if task.is_empty() { text.to_string() } else { task }
    }

    async fn delegate_to_agent(&self, text: &str, task_id: Option<&str>) -> String {
        let Some(agent_name) = self.extract_agent_name(text) else {
            return "❌ Could not identify which agent to delegate to. \
                    Please specify the agent name."
                .into();
        };

        let Some(card) = self.registry.get(&agent_name) else {
            return format!("❌ Agent '{agent_name}' not found in registry.");
        };

        let task = self.extract_task(text, &agent_name);
        match self.call_agent(&card, &task, task_id).await {
            Ok(result) => format!("✅ Delegated to {agent_name}:\n{result}"),
            Err(e) => {
                warn!(agent = %agent_name, error = %e, "Delegation failed");
                format!("❌ Failed to communicate with {agent_name}: {e}")
            }
        }
    }

    async fn route_to_external_agent(
        &self,
        intent: Intent,
        text: &str,
        conversation_id: &str,
    ) -> String {
        if !self.config.enable_a2a {
            return "❌ External agent routing is disabled".into();
        }

        let agent_name = match intent {
            Intent::Insurance => "insurance_agent",
            Intent::Weather => "weather_agent",
            _ => return format!("❌ No external agent configured for intent: {intent}"),
        };

        let Some(card) = self.registry.get(agent_name) else {
            return format!(
                "❌ External agent '{agent_name}' not found. \
                 Is it running on its configured port?"
            );
        };

        let emoji = match intent {
            Intent::Insurance => "🏥",
            Intent::Weather => "🌤️",
            _ => "🔗",
        };

        match self.call_agent(&card, text, Some(conversation_id)).await {
            Ok(result) => format!("{emoji} **{}**: {result}", card.display_name()),
            Err(e) => {
                warn!(agent = %agent_name, error = %e, "External agent call failed");
                format!(
                    "❌ Failed to communicate with {agent_name}: {e}\n\n\
                     💡 Tip: Make sure the {agent_name} is running on {}",
                    card.url
                )
            }
        }
    }

    /// All outbound agent calls go through the per-URL circuit breaker.
    async fn call_agent(
        &self,
        card: &AgentCard,
        task: &str,
        task_id: Option<&str>,
    ) -> Result<String, switchyard_core::AgentError> {
        let breaker = self
            .breakers
            .get(&format!("agent:{}", card.name), BreakerConfig::default());
        let client = self.pool.get_client(&card.url);
        breaker
            .call(|| async { client.delegate_task(task, task_id).await })
            .await
    }

    fn validate_and_sanitize(&self, result: String) -> String {
        let sanitized = self.guardrails.sanitize_output(&result, true);
        match self.guardrails.validate_output(&sanitized) {
            Ok(()) => sanitized,
            Err(reason) => format!("❌ Output validation failed: {reason}"),
        }
    }
}

fn classification_metadata(
    intent: &str,
    used_llm: bool,
    provider: &str,
) -> serde_json::Map<String, serde_json::Value> {
    let mut metadata = serde_json::Map::new();
    metadata.insert("intent".into(), serde_json::json!(intent));
    metadata.insert("used_llm".into(), serde_json::json!(used_llm));
    metadata.insert("provider".into(), serde_json::json!(provider));
    metadata
}
