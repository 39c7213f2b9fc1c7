//! Connecticut real-estate sales (data.ct.gov Socrata view).
//!
//! `dataset = rows` (default) returns the sales export; `dataset = columns`
//! returns the data dictionary describing those rows.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RealEstateConfig;
use crate::error::{ProviderFailure, ProviderResult};
use crate::gateway::{Gateway, ensure_kind};
use crate::http::{HttpRequest, HttpTransport};
use crate::types::{ProviderKind, ProviderQuery};

/// Which resource to fetch: `rows` or `columns`.
pub const PARAM_DATASET: &str = "dataset";
/// Socrata `accessType`, defaults to `DOWNLOAD`.
pub const PARAM_ACCESS_TYPE: &str = "access_type";

/// Gateway for the sales dataset.
pub struct RealEstateSalesGateway {
    transport: Arc<dyn HttpTransport>,
    rows_url: String,
    columns_url: String,
    timeout: Duration,
}

impl RealEstateSalesGateway {
    /// Build from configuration. The dataset is public; no key needed.
    #[must_use]
    pub fn from_config(config: &RealEstateConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            rows_url: config.rows_url.clone(),
            columns_url: config.columns_url.clone(),
            timeout: config.timeout(),
        }
    }
}

#[async_trait]
impl Gateway for RealEstateSalesGateway {
    fn name(&self) -> &str {
        "ct_real_estate"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::RealEstate
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&self, query: &ProviderQuery, timeout: Duration) -> ProviderResult {
        ensure_kind(self.name(), self.kind(), query)?;

        let request = match query.param(PARAM_DATASET).unwrap_or("rows") {
            "rows" => HttpRequest::get(&self.rows_url, timeout).with_query(
                "accessType",
                query.param(PARAM_ACCESS_TYPE).unwrap_or("DOWNLOAD"),
            ),
            "columns" => HttpRequest::get(&self.columns_url, timeout),
            other => {
                return Err(ProviderFailure::invalid_query(format!(
                    "unknown real estate dataset '{other}' (expected rows or columns)"
                )));
            }
        };

        let body = self.transport.execute(request).await?.json()?;
        if body.is_object() || body.is_array() {
            Ok(body)
        } else {
            Err(ProviderFailure::malformed("real estate response is not a JSON document"))
        }
    }
}
