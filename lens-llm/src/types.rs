//! Core types for LLM conversations and completions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tokens::{HeuristicEstimator, TokenEstimator};

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the whole conversation.
    System,
    /// The caller.
    User,
    /// A previous model reply.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

/// One chat message, serialized as `{"role": ..., "content": ...}`.
///
/// The token estimate is taken once, when the message is built, and
/// travels with it. Replacing `content` afterwards does not refresh it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireMessage")]
pub struct LlmMessage {
    /// Speaker.
    pub role: Role,
    /// Text.
    pub content: String,
    #[serde(skip_serializing)]
    estimated_tokens: usize,
}

impl LlmMessage {
    /// Create a message, estimated with the whitespace + punctuation
    /// heuristic.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::with_estimator(role, content, &HeuristicEstimator)
    }

    /// Create a message, estimated with `estimator`.
    #[must_use]
    pub fn with_estimator(role: Role, content: impl Into<String>, estimator: &dyn TokenEstimator) -> Self {
        let content = content.into();
        let estimated_tokens = estimator.estimate(&content);
        Self {
            role,
            content,
            estimated_tokens,
        }
    }

    /// System message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// User message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Token estimate taken at construction, without framing overhead.
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        self.estimated_tokens
    }
}

#[derive(Deserialize)]
struct WireMessage {
    role: Role,
    content: String,
}

impl From<WireMessage> for LlmMessage {
    fn from(wire: WireMessage) -> Self {
        Self::new(wire.role, wire.content)
    }
}

/// A completion returned by one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text, unparsed.
    pub text: String,
    /// Provider that answered ("ollama", "cloudflare", "openai").
    pub provider: String,
    /// Model that answered.
    pub model: String,
    /// Wall-clock latency of the HTTP exchange.
    pub latency_ms: u64,
    /// Estimated size of the prompt sent.
    pub prompt_tokens: usize,
    /// Completion size: provider-reported when available, else estimated.
    pub completion_tokens: usize,
}
