//! Edge inference (Cloudflare Workers AI).
//!
//! The endpoint is the account's `.../ai/run/` prefix; the model id is
//! appended to it. Workers AI reports failures in-band with
//! `success: false`.

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

/// Gateway for `POST {api_url}{model}`.
pub struct CloudflareGateway {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    budget: TokenBudget,
}

impl CloudflareGateway {
    /// Build from configuration.
    ///
    /// # Errors
    /// `LlmError::Config` when the endpoint or API key is missing.
    pub fn from_config(config: &LlmConfig, transport: Arc<dyn HttpTransport>) -> Result<Self, LlmError> {
        let edge = &config.edge;
        let api_url = edge
            .api_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| LlmError::Config("llm.edge.api_url is required".into()))?;
        let api_key = edge
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::Config("llm.edge.api_key is required".into()))?;
        Ok(Self {
            transport,
            api_url,
            api_key,
            model: edge.model.clone(),
            timeout: edge.timeout(),
            budget: TokenBudget::from(config),
        })
    }
}

#[async_trait]
impl Gateway for CloudflareGateway {
    fn name(&self) -> &str {
        "cloudflare"
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
impl LlmGateway for CloudflareGateway {
    fn model(&self) -> &str {
        &self.model
    }

    fn budget(&self) -> TokenBudget {
        self.budget
    }

    async fn complete_within(&self, messages: &[LlmMessage], timeout: Duration) -> ProviderResult<Completion> {
        let started = Instant::now();
        let request = HttpRequest::post_json(
            format!("{}{}", self.api_url, self.model),
            json!({ "messages": messages }),
            timeout,
        )
        .with_bearer(&self.api_key);
        let reply = self.transport.execute(request).await?.json()?;

        if reply["success"].as_bool() == Some(false) {
            return Err(ProviderFailure::malformed(format!(
                "workers ai reported failure: {}",
                reply["errors"]
            )));
        }
        let Some(text) = reply["result"]["response"].as_str() else {
            return Err(ProviderFailure::malformed("workers ai reply has no result.response"));
        };
        Ok(completion(self.name(), &self.model, messages, text.to_string(), started, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_core::ErrorKind;
    use lens_core::mock::ScriptedTransport;

    fn config() -> LlmConfig {
        let mut config = LlmConfig::default();
        config.edge.api_url = Some("https://api.cloudflare.test/client/v4/accounts/abc/ai/run/".into());
        config.edge.api_key = Some("cf-token".into());
        config
    }

    #[tokio::test]
    async fn model_is_appended_to_endpoint() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, &json!({"success": true, "result": {"response": "<ANSWER>Mill</ANSWER>"}}));
        let gateway = CloudflareGateway::from_config(&config(), transport.clone()).expect("configured");

        let completion = gateway.complete(&[LlmMessage::user("a mill")]).await.expect("ok");

        assert_eq!(completion.text, "<ANSWER>Mill</ANSWER>");
        let sent = &transport.requests()[0];
        assert_eq!(
            sent.url,
            "https://api.cloudflare.test/client/v4/accounts/abc/ai/run/@cf/mistral/mistral-7b-instruct-v0.1"
        );
        assert!(
            sent.headers
                .iter()
                .any(|(k, v)| k == "Authorization" && v == "Bearer cf-token")
        );
    }

    #[tokio::test]
    async fn in_band_failure_is_malformed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, &json!({"success": false, "errors": [{"code": 5006, "message": "bad input"}]}));
        let gateway = CloudflareGateway::from_config(&config(), transport).expect("configured");

        let err = gateway.complete(&[LlmMessage::user("x")]).await.expect_err("failure");
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn requires_endpoint_and_key() {
        let transport: Arc<dyn HttpTransport> = Arc::new(ScriptedTransport::new());
        assert!(matches!(
            CloudflareGateway::from_config(&LlmConfig::default(), transport),
            Err(LlmError::Config(_))
        ));
    }
}
