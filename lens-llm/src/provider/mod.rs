//! The LLM provider family.
//!
//! Each provider is a [`Gateway`] for `LlmComplete` queries and an
//! [`LlmGateway`] for callers that already hold a conversation:
//!
//! | Provider | Endpoint | Reply field |
//! |----------|----------|-------------|
//! | [`OllamaGateway`] | `POST {base}/api/chat` | `message.content` |
//! | [`CloudflareGateway`] | `POST {api_url}{model}` | `result.response` |
//! | [`OpenAiGateway`] | `POST {base}/v1/chat/completions` | `choices[0].message.content` |

use std::time::{Duration, Instant};

use async_trait::async_trait;
use lens_core::error::ProviderResult;
use lens_core::gateway::{Gateway, ensure_kind, required_param};
use lens_core::types::{ProviderKind, ProviderQuery};
use serde_json::Value;
use tracing::debug;

use crate::prompt::{SystemPrompt, parse_answer};
use crate::queue::{MessageQueue, TokenBudget};
use crate::tokens::{estimate_combined_tokens, estimate_tokens};
use crate::types::{Completion, LlmMessage};

pub mod cloudflare;
pub mod ollama;
pub mod openai;

pub use cloudflare::CloudflareGateway;
pub use ollama::OllamaGateway;
pub use openai::OpenAiGateway;

/// The user prompt of an `LlmComplete` query.
pub const PARAM_PROMPT: &str = "prompt";
/// Optional task instructions for the system prompt.
pub const PARAM_INSTRUCTIONS: &str = "instructions";

/// Build an `LlmComplete` query.
#[must_use]
pub fn prompt_query(prompt: &str, instructions: Option<&str>) -> ProviderQuery {
    let query = ProviderQuery::new(ProviderKind::LlmComplete).with_param(PARAM_PROMPT, prompt);
    match instructions {
        Some(instructions) => query.with_param(PARAM_INSTRUCTIONS, instructions),
        None => query,
    }
}

/// A chat-completion provider.
#[async_trait]
pub trait LlmGateway: Gateway {
    /// Model the provider sends requests to.
    fn model(&self) -> &str;

    /// Budget applied to prompts built by [`Gateway::send`].
    fn budget(&self) -> TokenBudget;

    /// Complete `messages`, giving up after `timeout`.
    async fn complete_within(&self, messages: &[LlmMessage], timeout: Duration) -> ProviderResult<Completion>;

    /// Complete `messages` with the provider's default timeout.
    async fn complete(&self, messages: &[LlmMessage]) -> ProviderResult<Completion> {
        self.complete_within(messages, self.default_timeout()).await
    }
}

/// `Gateway::send` for every LLM provider: build `[system, user]` from the
/// query, fit it to the budget, complete, and return the tagged answer as a
/// JSON string.
pub(crate) async fn send_prompt<G>(gateway: &G, query: &ProviderQuery, timeout: Duration) -> ProviderResult
where
    G: LlmGateway + ?Sized,
{
    ensure_kind(gateway.name(), ProviderKind::LlmComplete, query)?;
    let prompt = required_param(query, PARAM_PROMPT)?;
    let system = SystemPrompt::default().with_instructions(query.param(PARAM_INSTRUCTIONS).unwrap_or_default());

    let mut queue = MessageQueue::new(gateway.budget());
    queue.push_system(system.render())?;
    queue.push_user(prompt)?;
    queue.fit_to_budget()?;

    let completion = gateway.complete_within(&queue.messages(), timeout).await?;
    Ok(Value::String(parse_answer(&completion.text)?))
}

/// Assemble completion metadata once the reply text is in hand.
pub(crate) fn completion(
    provider: &str,
    model: &str,
    messages: &[LlmMessage],
    text: String,
    started: Instant,
    reported_completion_tokens: Option<u64>,
) -> Completion {
    let latency_ms = started.elapsed().as_millis() as u64;
    let prompt_tokens = estimate_combined_tokens(messages);
    let completion_tokens = reported_completion_tokens
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_else(|| estimate_tokens(&text));
    debug!(
        provider,
        model,
        latency_ms,
        prompt_tokens,
        completion_tokens,
        "LLM completion received"
    );
    Completion {
        text,
        provider: provider.to_string(),
        model: model.to_string(),
        latency_ms,
        prompt_tokens,
        completion_tokens,
    }
}
