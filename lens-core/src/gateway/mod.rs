//! Provider gateway contract.
//!
//! Every upstream (geocoding, news, real estate, parks, and the LLM family
//! in `lens-llm`) implements [`Gateway`]. A gateway is a stateless adapter:
//! it turns a [`ProviderQuery`] into one HTTP exchange and the response
//! into a [`ProviderResult`]. Gateways never retry; see
//! [`crate::retry`] for the caller-side policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ProviderFailure, ProviderResult};
use crate::types::{ProviderKind, ProviderQuery};

pub mod geocoding;
pub mod news;
pub mod parks;
pub mod real_estate;

pub use geocoding::GoogleGeocodingGateway;
pub use news::NewsGateway;
pub use parks::NpsParksGateway;
pub use real_estate::RealEstateSalesGateway;

/// Uniform contract for all upstream providers.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Short identifier used in logs ("google_geocoding", "ollama", ...).
    fn name(&self) -> &str;

    /// The query kind this gateway answers.
    fn kind(&self) -> ProviderKind;

    /// Timeout used by [`Gateway::fetch`].
    fn default_timeout(&self) -> Duration;

    /// Dispatch `query`, giving up after `timeout`.
    ///
    /// Non-2xx and transport failures are `Network`; unparseable 2xx
    /// bodies are `MalformedResponse`.
    async fn send(&self, query: &ProviderQuery, timeout: Duration) -> ProviderResult;

    /// Dispatch `query` with the gateway's default timeout.
    async fn fetch(&self, query: &ProviderQuery) -> ProviderResult {
        self.send(query, self.default_timeout()).await
    }
}

/// Reject a query addressed to a different provider family.
///
/// # Errors
/// Returns `InvalidQuery` on a kind mismatch.
pub fn ensure_kind(gateway: &str, expected: ProviderKind, query: &ProviderQuery) -> ProviderResult<()> {
    if query.kind() == expected {
        Ok(())
    } else {
        Err(ProviderFailure::invalid_query(format!(
            "{gateway} handles {expected} queries, got {}",
            query.kind()
        )))
    }
}

/// Fetch a required, non-blank parameter.
///
/// # Errors
/// Returns `InvalidQuery` when the parameter is missing or blank.
pub fn required_param<'q>(query: &'q ProviderQuery, key: &str) -> ProviderResult<&'q str> {
    query
        .param(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ProviderFailure::invalid_query(format!("{} query requires '{key}'", query.kind()))
        })
}

/// Gateways keyed by the query kind they answer.
#[derive(Default, Clone)]
pub struct GatewayRegistry {
    gateways: HashMap<ProviderKind, Arc<dyn Gateway>>,
}

impl GatewayRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gateway, replacing any previous one for the same kind.
    pub fn register(&mut self, gateway: Arc<dyn Gateway>) {
        self.gateways.insert(gateway.kind(), gateway);
    }

    /// The gateway for `kind`, if registered.
    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn Gateway>> {
        self.gateways.get(&kind).cloned()
    }

    /// Route `query` to the gateway registered for its kind.
    ///
    /// # Errors
    /// `InvalidQuery` when nothing is registered; otherwise whatever the
    /// gateway returns.
    pub async fn dispatch(&self, query: &ProviderQuery, timeout: Duration) -> ProviderResult {
        let gateway = self.get(query.kind()).ok_or_else(|| {
            ProviderFailure::invalid_query(format!("no gateway registered for {}", query.kind()))
        })?;
        gateway.send(query, timeout).await
    }

    /// Number of registered gateways.
    #[must_use]
    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    /// Whether no gateway is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.gateways.values().map(|g| g.name()).collect();
        f.debug_struct("GatewayRegistry").field("gateways", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Echo;

    #[async_trait]
    impl Gateway for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::News
        }
        fn default_timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn send(&self, query: &ProviderQuery, _timeout: Duration) -> ProviderResult {
            ensure_kind(self.name(), self.kind(), query)?;
            Ok(serde_json::json!({ "q": required_param(query, "q")? }))
        }
    }

    #[tokio::test]
    async fn registry_routes_by_kind() {
        let mut registry = GatewayRegistry::new();
        registry.register(Arc::new(Echo));

        let query = ProviderQuery::new(ProviderKind::News).with_param("q", "Salem");
        let payload = registry
            .dispatch(&query, Duration::from_secs(1))
            .await
            .expect("routed");
        assert_eq!(payload["q"], "Salem");

        let parks = ProviderQuery::new(ProviderKind::Parks);
        let err = registry
            .dispatch(&parks, Duration::from_secs(1))
            .await
            .expect_err("nothing registered for parks");
        assert_eq!(err.kind, ErrorKind::InvalidQuery);
    }

    #[tokio::test]
    async fn blank_required_param_is_invalid() {
        let query = ProviderQuery::new(ProviderKind::News).with_param("q", "  ");
        let err = Echo.fetch(&query).await.expect_err("blank q");
        assert_eq!(err.kind, ErrorKind::InvalidQuery);
    }

    #[test]
    fn kind_mismatch_is_invalid() {
        let query = ProviderQuery::new(ProviderKind::Geocode);
        let err = ensure_kind("echo", ProviderKind::News, &query).expect_err("mismatch");
        assert_eq!(err.kind, ErrorKind::InvalidQuery);
    }
}
