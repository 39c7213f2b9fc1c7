//! LLM error types.
//!
//! Calls to a provider fail with [`ProviderFailure`], same as every other
//! gateway. [`LlmError`] covers what can go wrong before a call is made.

use lens_core::error::{ErrorKind, ProviderFailure};
use thiserror::Error;

/// Errors that can occur while wiring up or driving the LLM family.
#[derive(Debug, Error)]
pub enum LlmError {
    /// A provider call failed.
    #[error("LLM provider call failed: {0}")]
    Provider(#[from] ProviderFailure),

    /// A provider is missing required settings (endpoint, API key).
    #[error("LLM configuration error: {0}")]
    Config(String),

    /// No provider in the priority list could be built.
    #[error("No LLM provider is configured")]
    NoProviders,
}

impl LlmError {
    /// The provider failure kind, if this error came from a call.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Provider(failure) => Some(failure.kind),
            Self::Config(_) | Self::NoProviders => None,
        }
    }
}
