//! Chat operation: throttled, bounded-context conversation with the generative backend.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;

use crate::error::{Capability, GatewayError};
use crate::invoker::{CallOutcome, ResilientInvoker};
use crate::rate_limit::{check_admission, RateLimitRegistry};
use crate::telemetry::{
    emit_best_effort, DegradeReason, FallbackEvent, GatewayEvent, NullSink, TelemetrySink,
};

/// Prior turns kept in the prompt unless configured otherwise.
pub const DEFAULT_HISTORY_TURNS: usize = 6;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant for a provider data \
validation application. Be concise, helpful, and professional. Keep responses under 150 words \
unless more detail is specifically requested.";

pub const DEFAULT_UNAVAILABLE_MESSAGE: &str = "I'm currently unavailable. Please ensure the AI \
service is configured properly. In the meantime, I can tell you that this application helps \
validate healthcare provider data using multi-agent AI systems.";

pub const DEFAULT_APOLOGY_MESSAGE: &str =
    "I encountered an issue processing your request. Please try again or rephrase your question.";

/// Speaker of a conversation turn.
///
/// Any tag other than `user`, including a missing one, is treated as the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    User,
    #[default]
    Assistant,
}

impl Role {
    pub fn from_tag(tag: &str) -> Self {
        if tag == "user" {
            Role::User
        } else {
            Role::Assistant
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Role::from_tag(&tag))
    }
}

/// One prior turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Assembles the prompt sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    system_prompt: String,
    history_turns: usize,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT, DEFAULT_HISTORY_TURNS)
    }
}

impl PromptTemplate {
    pub fn new(system_prompt: impl Into<String>, history_turns: usize) -> Self {
        Self { system_prompt: system_prompt.into(), history_turns }
    }

    pub fn history_turns(&self) -> usize {
        self.history_turns
    }

    /// System preamble, the last `history_turns` turns, the new message, and a trailing
    /// `Assistant:` cue.
    pub fn render(&self, message: &str, history: &[ChatTurn]) -> String {
        let start = history.len().saturating_sub(self.history_turns);
        let mut conversation = String::new();
        for turn in &history[start..] {
            conversation.push_str(turn.role.prefix());
            conversation.push_str(": ");
            conversation.push_str(&turn.content);
            conversation.push('\n');
        }
        conversation.push_str("User: ");
        conversation.push_str(message);
        conversation.push_str("\nAssistant:");

        format!("{}\n\nConversation:\n{}", self.system_prompt, conversation)
    }
}

/// User-safe replies served instead of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedReplies {
    pub unavailable: String,
    pub apology: String,
}

impl Default for DegradedReplies {
    fn default() -> Self {
        Self {
            unavailable: DEFAULT_UNAVAILABLE_MESSAGE.to_string(),
            apology: DEFAULT_APOLOGY_MESSAGE.to_string(),
        }
    }
}

/// Throttled chat service.
pub struct ChatService<S = NullSink> {
    registry: Arc<RateLimitRegistry>,
    invoker: Arc<ResilientInvoker<S>>,
    template: PromptTemplate,
    replies: DegradedReplies,
    sink: S,
}

impl<S> ChatService<S> {
    /// The invoker's sink also receives this service's admission and fallback events.
    pub fn new(registry: Arc<RateLimitRegistry>, invoker: Arc<ResilientInvoker<S>>, sink: S) -> Self {
        Self {
            registry,
            invoker,
            template: PromptTemplate::default(),
            replies: DegradedReplies::default(),
            sink,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_replies(mut self, replies: DegradedReplies) -> Self {
        self.replies = replies;
        self
    }

    pub fn registry(&self) -> &Arc<RateLimitRegistry> {
        &self.registry
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }
}

impl<S> ChatService<S>
where
    S: TelemetrySink,
    S::Future: Send + 'static,
{
    /// Answer `message` given prior `history`.
    ///
    /// Errors are [`GatewayError::RateLimited`] (local throttling, backend untouched) and
    /// [`GatewayError::UpstreamQuotaExhausted`]. A missing credential or any other backend
    /// failure yields a fixed reply instead of an error.
    pub async fn chat(
        &self,
        identity: &str,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String, GatewayError> {
        check_admission(&self.registry, Capability::Chat, identity, &self.sink).await?;

        let prompt = self.template.render(message, history);
        match self.invoker.invoke(&prompt).await {
            CallOutcome::Success(text) => Ok(text),
            CallOutcome::QuotaExceeded => Err(GatewayError::UpstreamQuotaExhausted),
            CallOutcome::Unconfigured => {
                Ok(self.degrade(DegradeReason::Unconfigured, &self.replies.unavailable).await)
            }
            CallOutcome::OtherFailure(_) => {
                Ok(self.degrade(DegradeReason::BackendFailure, &self.replies.apology).await)
            }
        }
    }

    async fn degrade(&self, reason: DegradeReason, reply: &str) -> String {
        info!(target: "turnstile::chat", %reason, "serving degraded chat reply");
        emit_best_effort(
            self.sink.clone(),
            GatewayEvent::Fallback(FallbackEvent::DegradedReply { reason }),
        )
        .await;
        reply.to_string()
    }
}
