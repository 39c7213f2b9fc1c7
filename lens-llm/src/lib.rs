//! # lens-llm: LLM gateway family for UrbanLens
//!
//! Three interchangeable chat-completion providers behind one contract:
//!   - **Ollama** (local model server)
//!   - **Cloudflare Workers AI** (edge inference)
//!   - **OpenAI-compatible API** (hosted)
//!
//! Every provider implements [`lens_core::gateway::Gateway`], so an LLM
//! call looks like any other upstream call: a query in, a
//! [`lens_core::ProviderResult`] out. On top of that:
//!
//! - Token budgeting: conversations are estimated and trimmed to fit
//!   ([`queue`], [`tokens`]).
//! - Answer extraction: replies carry their answer in `<ANSWER>` tags
//!   ([`prompt`]).
//! - Fallback: providers are tried in priority order ([`fallback`]).
//! - Category suggestion for locations ([`suggest`]).
//!
//! ```text
//! LocationDescription ─► CategorySuggester ─► FallbackChain ─┬─► Cloudflare
//!                                                            ├─► Ollama
//!                                                            └─► OpenAI
//! ```

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod fallback;
pub mod prompt;
pub mod provider;
pub mod queue;
pub mod suggest;
pub mod tokens;
pub mod types;

pub use error::LlmError;
pub use fallback::FallbackChain;
pub use provider::{CloudflareGateway, LlmGateway, OllamaGateway, OpenAiGateway};
pub use queue::{MessageQueue, TokenBudget};
pub use suggest::{CategorySuggester, LocationDescription};
pub use tokens::{HeuristicEstimator, TokenEstimator, estimate_combined_tokens, estimate_tokens};
pub use types::{Completion, LlmMessage, Role};
