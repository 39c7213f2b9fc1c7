//! Provider fallback chain.
//!
//! Providers are tried in priority order. Any failure moves on to the next
//! provider; the first success wins. When every provider fails, the last
//! failure is returned.

use std::sync::Arc;

use lens_core::config::{LlmBackend, LlmConfig};
use lens_core::error::{ProviderFailure, ProviderResult};
use lens_core::http::HttpTransport;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::prompt::{SystemPrompt, parse_answer};
use crate::provider::{CloudflareGateway, LlmGateway, OllamaGateway, OpenAiGateway};
use crate::queue::{MessageQueue, TokenBudget};
use crate::types::{Completion, LlmMessage};

/// Ordered list of LLM providers.
#[derive(Clone)]
pub struct FallbackChain {
    providers: Vec<Arc<dyn LlmGateway>>,
    budget: TokenBudget,
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("providers", &self.provider_names())
            .field("budget", &self.budget)
            .finish()
    }
}

impl FallbackChain {
    /// Chain over `providers`, tried in the given order.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn LlmGateway>>, budget: TokenBudget) -> Self {
        Self { providers, budget }
    }

    /// Build the providers named in `config.priority`. Providers missing
    /// credentials are skipped with a warning.
    ///
    /// # Errors
    /// `LlmError::NoProviders` when none could be built.
    pub fn from_config(config: &LlmConfig, transport: &Arc<dyn HttpTransport>) -> Result<Self, LlmError> {
        let mut providers: Vec<Arc<dyn LlmGateway>> = Vec::new();
        for backend in &config.priority {
            let built: Result<Arc<dyn LlmGateway>, LlmError> = match backend {
                LlmBackend::Local => Ok(Arc::new(OllamaGateway::from_config(config, transport.clone()))),
                LlmBackend::Edge => CloudflareGateway::from_config(config, transport.clone())
                    .map(|g| Arc::new(g) as Arc<dyn LlmGateway>),
                LlmBackend::Hosted => OpenAiGateway::from_config(config, transport.clone())
                    .map(|g| Arc::new(g) as Arc<dyn LlmGateway>),
            };
            match built {
                Ok(provider) => providers.push(provider),
                Err(e) => warn!(backend = ?backend, error = %e, "Skipping LLM provider"),
            }
        }
        if providers.is_empty() {
            return Err(LlmError::NoProviders);
        }
        Ok(Self::new(providers, TokenBudget::from(config)))
    }

    /// Provider names in priority order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Budget used by [`FallbackChain::ask`].
    #[must_use]
    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    /// Complete `messages` with the first provider that succeeds.
    ///
    /// # Errors
    /// The last provider's failure when all of them fail.
    pub async fn complete(&self, messages: &[LlmMessage]) -> ProviderResult<Completion> {
        self.first_success(|provider| async move { provider.complete(messages).await })
            .await
    }

    /// Ask a single question and return the tagged answer. A reply without
    /// a usable answer counts as a failure and moves on to the next provider.
    ///
    /// # Errors
    /// `BudgetExceeded` if the prompt cannot fit; otherwise the last
    /// provider's failure when all of them fail.
    pub async fn ask(&self, system: &SystemPrompt, prompt: &str) -> ProviderResult<String> {
        let mut queue = MessageQueue::new(self.budget);
        queue.push_system(system.render())?;
        queue.push_user(prompt)?;
        queue.fit_to_budget()?;
        let messages = queue.messages();
        let messages = messages.as_slice();

        self.first_success(|provider| async move {
            let completion = provider.complete(messages).await?;
            parse_answer(&completion.text)
        })
        .await
    }

    async fn first_success<T, F, Fut>(&self, mut attempt: F) -> ProviderResult<T>
    where
        F: FnMut(Arc<dyn LlmGateway>) -> Fut,
        Fut: std::future::Future<Output = ProviderResult<T>>,
    {
        let mut last_failure = None;
        for provider in &self.providers {
            match attempt(provider.clone()).await {
                Ok(value) => {
                    debug!(provider = provider.name(), "LLM provider answered");
                    return Ok(value);
                }
                Err(failure) => {
                    warn!(
                        provider = provider.name(),
                        kind = %failure.kind,
                        detail = %failure.detail,
                        "LLM provider failed, trying next"
                    );
                    last_failure = Some(failure);
                }
            }
        }
        Err(last_failure.unwrap_or_else(|| ProviderFailure::invalid_query("no LLM providers in chain")))
    }
}
