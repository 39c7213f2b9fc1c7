//! Local model server (Ollama chat API).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lens_core::config::LlmConfig;
use lens_core::error::{ProviderFailure, ProviderResult};
use lens_core::gateway::Gateway;
use lens_core::http::{HttpRequest, HttpTransport};
use lens_core::types::{ProviderKind, ProviderQuery};
use serde_json::json;

use super::{LlmGateway, completion, send_prompt};
use crate::queue::TokenBudget;
use crate::types::{Completion, LlmMessage};

/// Gateway for `POST {base}/api/chat`.
pub struct OllamaGateway {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    model: String,
    timeout: Duration,
    budget: TokenBudget,
}

impl OllamaGateway {
    /// Build from configuration. A local server needs no credentials.
    #[must_use]
    pub fn from_config(config: &LlmConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            base_url: config.local.base_url.trim_end_matches('/').to_string(),
            model: config.local.model.clone(),
            timeout: config.local.timeout(),
            budget: TokenBudget::from(config),
        }
    }
}

#[async_trait]
impl Gateway for OllamaGateway {
    fn name(&self) -> &str {
        "ollama"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::LlmComplete
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&self, query: &ProviderQuery, timeout: Duration) -> ProviderResult {
        send_prompt(self, query, timeout).await
    }
}

#[async_trait]
impl LlmGateway for OllamaGateway {
    fn model(&self) -> &str {
        &self.model
    }

    fn budget(&self) -> TokenBudget {
        self.budget
    }

    async fn complete_within(&self, messages: &[LlmMessage], timeout: Duration) -> ProviderResult<Completion> {
        let started = Instant::now();
        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        let request = HttpRequest::post_json(format!("{}/api/chat", self.base_url), body, timeout);
        let reply = self.transport.execute(request).await?.json()?;

        let Some(text) = reply["message"]["content"].as_str() else {
            return Err(ProviderFailure::malformed("ollama reply has no message.content"));
        };
        Ok(completion(
            self.name(),
            &self.model,
            messages,
            text.to_string(),
            started,
            reply["eval_count"].as_u64(),
        ))
    }
}
