//! News API gateway: location string in, article list out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::NewsConfig;
use crate::error::{LensError, ProviderFailure, ProviderResult};
use crate::gateway::{Gateway, ensure_kind, required_param};
use crate::http::{HttpRequest, HttpTransport};
use crate::types::{ProviderKind, ProviderQuery};

/// Search text, usually a location or place name.
pub const PARAM_QUERY: &str = "q";

/// Gateway for a NewsAPI-style `/v2/everything` endpoint.
pub struct NewsGateway {
    transport: Arc<dyn HttpTransport>,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl NewsGateway {
    /// Build from configuration.
    ///
    /// # Errors
    /// Returns `LensError::Config` when no API key is configured.
    pub fn from_config(config: &NewsConfig, transport: Arc<dyn HttpTransport>) -> Result<Self, LensError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LensError::Config("news.api_key is required".into()))?;
        Ok(Self {
            transport,
            api_key,
            base_url: config.base_url.clone(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl Gateway for NewsGateway {
    fn name(&self) -> &str {
        "news"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::News
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Payload is the `articles` array.
    async fn send(&self, query: &ProviderQuery, timeout: Duration) -> ProviderResult {
        ensure_kind(self.name(), self.kind(), query)?;
        let q = required_param(query, PARAM_QUERY)?;

        let request = HttpRequest::get(&self.base_url, timeout)
            .with_query("q", q)
            .with_query("apiKey", &self.api_key);
        let mut body = self.transport.execute(request).await?.json()?;

        match body.get_mut("articles").map(serde_json::Value::take) {
            Some(articles) if articles.is_array() => Ok(articles),
            _ => Err(ProviderFailure::malformed("news response has no 'articles' array")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mock::ScriptedTransport;
    use serde_json::json;

    fn gateway(transport: Arc<ScriptedTransport>) -> NewsGateway {
        let config = NewsConfig {
            api_key: Some("news-key".into()),
            base_url: "http://news.test/v2/everything".into(),
            ..NewsConfig::default()
        };
        NewsGateway::from_config(&config, transport).expect("configured")
    }

    #[tokio::test]
    async fn returns_article_list() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(
            200,
            &json!({"status": "ok", "totalResults": 1, "articles": [{"title": "Asylum demolished"}]}),
        );
        let query = ProviderQuery::new(ProviderKind::News).with_param(PARAM_QUERY, "Danvers");

        let articles = gateway(transport.clone()).fetch(&query).await.expect("ok");

        assert_eq!(articles[0]["title"], "Asylum demolished");
        assert_eq!(transport.requests()[0].query_value("apiKey"), Some("news-key"));
    }

    #[tokio::test]
    async fn missing_articles_is_malformed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, &json!({"status": "ok"}));
        let query = ProviderQuery::new(ProviderKind::News).with_param(PARAM_QUERY, "Danvers");

        let err = gateway(transport).fetch(&query).await.expect_err("no articles");
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn unauthorized_is_network() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(401, &json!({"status": "error", "code": "apiKeyInvalid"}));
        let query = ProviderQuery::new(ProviderKind::News).with_param(PARAM_QUERY, "Danvers");

        let err = gateway(transport).fetch(&query).await.expect_err("401");
        assert_eq!(err.kind, ErrorKind::Network);
    }
}
