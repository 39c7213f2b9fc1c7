//! National Park Service API gateway: park code in, park metadata out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ParksConfig;
use crate::error::{LensError, ProviderFailure, ProviderResult};
use crate::gateway::{Gateway, ensure_kind, required_param};
use crate::http::{HttpRequest, HttpTransport};
use crate::types::{ProviderKind, ProviderQuery};

/// NPS park code, e.g. `acad`.
pub const PARAM_PARK_CODE: &str = "park_code";

/// Images listed in a park metadata payload.
#[must_use]
pub fn park_images(park: &Value) -> Vec<Value> {
    park["images"].as_array().cloned().unwrap_or_default()
}

/// Gateway for `developer.nps.gov/api/v1/parks`.
pub struct NpsParksGateway {
    transport: Arc<dyn HttpTransport>,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl NpsParksGateway {
    /// Build from configuration.
    ///
    /// # Errors
    /// Returns `LensError::Config` when no API key is configured.
    pub fn from_config(config: &ParksConfig, transport: Arc<dyn HttpTransport>) -> Result<Self, LensError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LensError::Config("parks.api_key is required".into()))?;
        Ok(Self {
            transport,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl Gateway for NpsParksGateway {
    fn name(&self) -> &str {
        "nps_parks"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Parks
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Payload is the first park object, or JSON `null` when the code
    /// matches no park.
    async fn send(&self, query: &ProviderQuery, timeout: Duration) -> ProviderResult {
        ensure_kind(self.name(), self.kind(), query)?;
        let park_code = required_param(query, PARAM_PARK_CODE)?;

        let request = HttpRequest::get(format!("{}/parks", self.base_url), timeout)
            .with_header("X-Api-Key", &self.api_key)
            .with_query("parkCode", park_code);
        let mut body = self.transport.execute(request).await?.json()?;

        let Some(Value::Array(parks)) = body.get_mut("data").map(Value::take) else {
            return Err(ProviderFailure::malformed("parks response has no 'data' array"));
        };
        Ok(parks.into_iter().next().unwrap_or(Value::Null))
    }
}
