//! Hosted API (OpenAI-compatible chat completions).

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
use crate::error::LlmError;
use crate::queue::TokenBudget;
use crate::types::{Completion, LlmMessage};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Resolve short model names to the ids the API expects.
#[must_use]
pub fn resolve_model(name: &str) -> String {
    let name = name.trim().to_lowercase();
    match name.as_str() {
        "" => DEFAULT_MODEL.to_string(),
        "gpt-3.5" => "gpt-3.5-turbo".to_string(),
        "gpt-4" => "gpt-4-1106-preview".to_string(),
        _ => name,
    }
}

/// Gateway for `POST {base}/v1/chat/completions`.
pub struct OpenAiGateway {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    api_key: String,
    model: String,
    max_completion_tokens: u32,
    timeout: Duration,
    budget: TokenBudget,
}

impl OpenAiGateway {
    /// Build from configuration.
    ///
    /// # Errors
    /// `LlmError::Config` when no API key is configured.
    pub fn from_config(config: &LlmConfig, transport: Arc<dyn HttpTransport>) -> Result<Self, LlmError> {
        let hosted = &config.hosted;
        let api_key = hosted
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::Config("llm.hosted.api_key is required".into()))?;
        Ok(Self {
            transport,
            base_url: hosted.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: resolve_model(&hosted.model),
            max_completion_tokens: hosted.max_completion_tokens,
            timeout: hosted.timeout(),
            budget: TokenBudget::from(config),
        })
    }
}

#[async_trait]
impl Gateway for OpenAiGateway {
    fn name(&self) -> &str {
        "openai"
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
impl LlmGateway for OpenAiGateway {
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
            "max_tokens": self.max_completion_tokens,
        });
        let request = HttpRequest::post_json(format!("{}/v1/chat/completions", self.base_url), body, timeout)
            .with_bearer(&self.api_key);
        let reply = self.transport.execute(request).await?.json()?;

        let Some(text) = reply["choices"][0]["message"]["content"].as_str() else {
            return Err(ProviderFailure::malformed("chat completion has no choices[0].message.content"));
        };
        Ok(completion(
            self.name(),
            &self.model,
            messages,
            text.to_string(),
            started,
            reply["usage"]["completion_tokens"].as_u64(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_core::ErrorKind;
    use lens_core::http::HttpResponse;
    use lens_core::mock::ScriptedTransport;

    fn config(model: &str) -> LlmConfig {
        let mut config = LlmConfig::default();
        config.hosted.api_key = Some("sk-test".into());
        config.hosted.model = model.into();
        config
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(resolve_model("GPT-4"), "gpt-4-1106-preview");
        assert_eq!(resolve_model("gpt-3.5"), "gpt-3.5-turbo");
        assert_eq!(resolve_model(""), DEFAULT_MODEL);
        assert_eq!(resolve_model("gpt-4o-mini"), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn request_carries_model_and_limit() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(
            200,
            &json!({"choices": [{"message": {"role": "assistant", "content": "<ANSWER>Hotel</ANSWER>"}}], "usage": {"completion_tokens": 5}}),
        );
        let gateway = OpenAiGateway::from_config(&config("gpt-4"), transport.clone()).expect("configured");

        let completion = gateway.complete(&[LlmMessage::user("a hotel")]).await.expect("ok");

        assert_eq!(completion.model, "gpt-4-1106-preview");
        assert_eq!(completion.completion_tokens, 5);
        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://api.openai.com/v1/chat/completions");
        let body = sent.body.as_ref().expect("body");
        assert_eq!(body["model"], "gpt-4-1106-preview");
        assert_eq!(body["max_tokens"], 1024);
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, &json!({"choices": []}));
        let gateway = OpenAiGateway::from_config(&config(""), transport).expect("configured");

        let err = gateway.complete(&[LlmMessage::user("x")]).await.expect_err("no choices");
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn rate_limit_is_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut limited = HttpResponse::new(429, "{}");
        limited.retry_after = Some("20".into());
        transport.push(limited);
        let gateway = OpenAiGateway::from_config(&config(""), transport).expect("configured");

        let err = gateway.complete(&[LlmMessage::user("x")]).await.expect_err("429");
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(err.detail.contains("20"));
    }
}
