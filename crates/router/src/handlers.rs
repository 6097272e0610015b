//! Reference task handlers.
//!
//! Handlers are side-effect-free on the core's data: they read the request
//! text and conversation history and return a single string. The router owns
//! prefixes, guardrails, and memory; handlers own only their domain wording.

use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use switchyard_core::{Result, Role, StoredMessage};

/// Pipeline-local context passed to a handler.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub text: String,
    pub history: Vec<StoredMessage>,
    pub conversation_id: String,
}

impl HandlerContext {
    pub fn new(
        text: impl Into<String>,
        history: Vec<StoredMessage>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            history,
            conversation_id: conversation_id.into(),
        }
    }
}

/// The contract every local task handler implements.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Display prefix the router puts in front of the result,
    /// e.g. `🎫 **Tickets Agent**`.
    fn display(&self) -> &str;

    async fn invoke(&self, ctx: &HandlerContext) -> Result<String>;
}

// --- Tickets ---

/// Handles support-ticket requests against a mocked ticket backend.
pub struct TicketsHandler {
    next_ticket_id: AtomicU32,
}

impl TicketsHandler {
    pub fn new() -> Self {
        Self {
            next_ticket_id: AtomicU32::new(1000),
        }
    }

    fn create_ticket(&self) -> u32 {
        self.next_ticket_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for TicketsHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskHandler for TicketsHandler {
    fn name(&self) -> &str {
        "tickets"
    }

    fn display(&self) -> &str {
        "🎫 **Tickets Agent**"
    }

    async fn invoke(&self, ctx: &HandlerContext) -> Result<String> {
        let text = ctx.text.trim().to_lowercase();

        let has_previous_ticket = ctx.history.iter().any(|msg| {
            msg.role == Role::Agent && msg.content.to_lowercase().contains("ticket")
        });

        // Follow-up about an earlier ticket
        if has_previous_ticket
            && (text.contains("status") || text.contains("update") || text.contains("check"))
        {
            return Ok("I can see you asked about a ticket earlier. To check ticket status, \
                       please provide the ticket ID or issue number."
                .into());
        }

        if text.contains("list") || text.contains("show") {
            return Ok("Ticket processed (mocked). Found 0 tickets.".into());
        }

        // Explicit create, or default to creating one
        let id = self.create_ticket();
        Ok(format!("Ticket processed (mocked). Ticket ID: {id}"))
    }
}

// --- Account ---

/// Handles account information and profile requests (mocked data).
pub struct AccountHandler;

#[async_trait]
impl TaskHandler for AccountHandler {
    fn name(&self) -> &str {
        "account"
    }

    fn display(&self) -> &str {
        "👤 **Account Agent**"
    }

    async fn invoke(&self, ctx: &HandlerContext) -> Result<String> {
        let text = ctx.text.trim().to_lowercase();

        if text.contains("update") || text.contains("change") || text.contains("edit") {
            return Ok("To update your profile, tell me which field to change \
                       (name, email, or notification settings)."
                .into());
        }

        if text.contains("status") || text.contains("info") || text.contains("settings") {
            return Ok("Your account is active. Plan: Standard. \
                       Notifications: enabled. Last login: today."
                .into());
        }

        Ok("I can show your account status or update your profile. \
            What would you like to do?"
            .into())
    }
}

// --- Payments ---

/// Payment execution is out of scope; this handler always refuses.
pub struct PaymentsHandler;

#[async_trait]
impl TaskHandler for PaymentsHandler {
    fn name(&self) -> &str {
        "payments"
    }

    fn display(&self) -> &str {
        "💳 **Payments Agent**"
    }

    async fn invoke(&self, _ctx: &HandlerContext) -> Result<String> {
        Ok("Payments are not supported in this version.".into())
    }
}

// --- General ---

const GREETINGS: &[&str] = &[
    "Hello! How can I assist you today?",
    "Hi there! What can I help you with?",
    "Greetings! I'm here to help.",
    "Hello! Nice to meet you. How may I help?",
];

const CAPABILITIES: &str = "I can help you with:\n\
• 🎫 **Support Tickets** - Create and manage support tickets for issues\n\
• 👤 **Account Management** - View and update your account information\n\
• 💳 **Payment Inquiries** - Answer questions about payments (note: actual payment processing is not available)\n\
• 🌤️ **EXT: Weather Information** - Get current weather and forecasts for any location worldwide\n\
• 🏥 **EXT: Insurance Services** - Manage insurance policies, get policy information, and create new policies\n\n\
Just let me know what you need, and I'll be happy to assist!";

const PAYMENT_INFO: &str = "Regarding payments, I can help you with:\n\
• View payment history and invoices\n\
• Answer questions about billing cycles\n\
• Explain payment methods\n\
• Provide information about charges\n\n\
**Important**: I cannot process actual payments or transactions. \
For payment processing, please contact your payment provider directly.";

const TICKET_INFO: &str = "For support tickets, I can help you:\n\
• Create new support tickets for any issues\n\
• View existing ticket status\n\
• Update ticket information\n\
• Track ticket resolution\n\n\
Just describe your issue and I'll help you create a ticket!";

const ACCOUNT_INFO: &str = "For account management, I can assist with:\n\
• Viewing your account information\n\
• Updating profile details\n\
• Checking account status\n\
• Managing account settings\n\n\
What would you like to know about your account?";

/// Handles greetings, thanks, capability questions, and domain explainers.
pub struct GeneralHandler;

impl GeneralHandler {
    fn is_question(text: &str) -> bool {
        ["what", "how", "can you", "do you", "tell me", "explain"]
            .iter()
            .any(|q| text.contains(q))
    }
}

#[async_trait]
impl TaskHandler for GeneralHandler {
    fn name(&self) -> &str {
        "general"
    }

    fn display(&self) -> &str {
        "💬 **General Agent**"
    }

    async fn invoke(&self, ctx: &HandlerContext) -> Result<String> {
        let text = ctx.text.trim().to_lowercase();

        // Domain questions first
        if Self::is_question(&text) {
            if ["payment", "pay", "billing", "invoice", "charge"]
                .iter()
                .any(|w| text.contains(w))
            {
                return Ok(PAYMENT_INFO.into());
            }
            if ["ticket", "support", "issue", "problem"]
                .iter()
                .any(|w| text.contains(w))
            {
                return Ok(TICKET_INFO.into());
            }
            if ["account", "profile", "user", "settings"]
                .iter()
                .any(|w| text.contains(w))
            {
                return Ok(ACCOUNT_INFO.into());
            }
        }

        if text.contains("thank") {
            return Ok("You're welcome! Is there anything else I can help you with?".into());
        }

        if text.contains("bye") || text.contains("goodbye") {
            return Ok("Goodbye! Feel free to come back anytime you need help.".into());
        }

        if ["help", "what can you do", "who are you"]
            .iter()
            .any(|w| text.contains(w))
        {
            return Ok(CAPABILITIES.into());
        }

        if ["hello", "hi", "hey", "good morning", "good afternoon", "good evening", "greetings"]
            .iter()
            .any(|w| text.contains(w))
        {
            let index = rand::rng().random_range(0..GREETINGS.len());
            return Ok(GREETINGS[index].into());
        }

        Ok(CAPABILITIES.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(text: &str) -> HandlerContext {
        HandlerContext::new(text, Vec::new(), "c1")
    }

    fn ctx_with_history(text: &str, history: Vec<StoredMessage>) -> HandlerContext {
        HandlerContext::new(text, history, "c1")
    }

    #[tokio::test]
    async fn tickets_creates_by_default_with_increasing_ids() {
        let handler = TicketsHandler::new();
        let first = handler.invoke(&ctx("my login is broken")).await.unwrap();
        let second = handler.invoke(&ctx("create a ticket")).await.unwrap();
        assert!(first.contains("Ticket ID: 1000"));
        assert!(second.contains("Ticket ID: 1001"));
    }

    #[tokio::test]
    async fn tickets_lists_on_request() {
        let handler = TicketsHandler::new();
        let reply = handler.invoke(&ctx("list my tickets")).await.unwrap();
        assert!(reply.contains("Found 0 tickets"));
    }

    #[tokio::test]
    async fn tickets_follow_up_uses_history() {
        let handler = TicketsHandler::new();
        let history = vec![
            StoredMessage::new(Role::User, "create a ticket"),
            StoredMessage::new(Role::Agent, "Ticket processed (mocked). Ticket ID: 1000"),
        ];
        let reply = handler
            .invoke(&ctx_with_history("what's the status?", history))
            .await
            .unwrap();
        assert!(reply.contains("ticket ID or issue number"));
    }

    #[tokio::test]
    async fn tickets_status_without_history_creates() {
        let handler = TicketsHandler::new();
        let reply = handler.invoke(&ctx("status of things")).await.unwrap();
        assert!(reply.contains("Ticket ID:"));
    }

    #[tokio::test]
    async fn payments_always_refuses() {
        let handler = PaymentsHandler;
        for text in ["pay my bill", "make payment of $100", "anything"] {
            assert_eq!(
                handler.invoke(&ctx(text)).await.unwrap(),
                "Payments are not supported in this version."
            );
        }
    }

    #[tokio::test]
    async fn account_answers_status_and_update() {
        let handler = AccountHandler;
        let status = handler.invoke(&ctx("account status please")).await.unwrap();
        assert!(status.contains("active"));

        let update = handler.invoke(&ctx("update my profile")).await.unwrap();
        assert!(update.contains("update your profile"));
    }

    #[tokio::test]
    async fn general_greets_on_greeting() {
        let handler = GeneralHandler;
        let reply = handler.invoke(&ctx("hello")).await.unwrap();
        assert!(GREETINGS.contains(&reply.as_str()));
    }

    #[tokio::test]
    async fn general_explains_domains_on_questions() {
        let handler = GeneralHandler;
        let payments = handler
            .invoke(&ctx("what payment options do you support?"))
            .await
            .unwrap();
        assert!(payments.contains("cannot process actual payments"));

        let tickets = handler
            .invoke(&ctx("how do tickets work here"))
            .await
            .unwrap();
        assert!(tickets.contains("support tickets"));
    }

    #[tokio::test]
    async fn general_lists_capabilities_on_help() {
        let handler = GeneralHandler;
        let reply = handler.invoke(&ctx("help")).await.unwrap();
        assert!(reply.contains("Support Tickets"));
        assert!(reply.contains("Insurance Services"));
    }

    #[tokio::test]
    async fn general_thanks_and_farewell() {
        let handler = GeneralHandler;
        assert!(
            handler
                .invoke(&ctx("thanks a lot"))
                .await
                .unwrap()
                .contains("You're welcome")
        );
        assert!(
            handler
                .invoke(&ctx("goodbye"))
                .await
                .unwrap()
                .contains("Goodbye")
        );
    }

    #[test]
    fn display_prefixes() {
        assert_eq!(TicketsHandler::new().display(), "🎫 **Tickets Agent**");
        assert_eq!(AccountHandler.display(), "👤 **Account Agent**");
        assert_eq!(PaymentsHandler.display(), "💳 **Payments Agent**");
        assert_eq!(GeneralHandler.display(), "💬 **General Agent**");
    }
}
