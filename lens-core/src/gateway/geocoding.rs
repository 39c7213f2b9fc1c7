//! Google Geocoding API gateway.
//!
//! Forward geocoding takes an `address`; reverse geocoding takes
//! `latitude` + `longitude`. The payload is the upstream JSON document,
//! unmodified, so the cache can keep it verbatim.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::config::GeocodingConfig;
use crate::error::{LensError, ProviderFailure, ProviderResult};
use crate::gateway::{Gateway, ensure_kind, required_param};
use crate::http::{HttpRequest, HttpTransport};
use crate::types::{Coordinates, ProviderKind, ProviderQuery};

/// Free-text address for forward geocoding.
pub const PARAM_ADDRESS: &str = "address";
/// Latitude for reverse geocoding.
pub const PARAM_LATITUDE: &str = "latitude";
/// Longitude for reverse geocoding.
pub const PARAM_LONGITUDE: &str = "longitude";

/// Build a forward-geocoding query.
#[must_use]
pub fn place_query(place_name: &str) -> ProviderQuery {
    ProviderQuery::new(ProviderKind::Geocode).with_param(PARAM_ADDRESS, place_name)
}

/// Build a reverse-geocoding query.
#[must_use]
pub fn coordinates_query(point: Coordinates) -> ProviderQuery {
    let point = point.rounded();
    ProviderQuery::new(ProviderKind::Geocode)
        .with_param(PARAM_LATITUDE, format!("{:.6}", point.latitude))
        .with_param(PARAM_LONGITUDE, format!("{:.6}", point.longitude))
}

/// Coordinates of the first (most relevant) result.
#[must_use]
pub fn first_result_coordinates(payload: &Value) -> Option<Coordinates> {
    let location = &payload["results"][0]["geometry"]["location"];
    Some(Coordinates::new(
        location["lat"].as_f64()?,
        location["lng"].as_f64()?,
    ))
}

/// `formatted_address` of the first result.
#[must_use]
pub fn first_formatted_address(payload: &Value) -> Option<String> {
    payload["results"][0]["formatted_address"]
        .as_str()
        .map(str::to_string)
}

/// Whether the payload carries at least one result.
#[must_use]
pub fn has_results(payload: &Value) -> bool {
    payload["results"].as_array().is_some_and(|r| !r.is_empty())
}

static MAPS_SEARCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"maps/search/(-?\d+(?:\.\d+)?),\s*(-?\d+(?:\.\d+)?)").expect("valid regex")
});
static MAPS_PLACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"maps/place/([^/?#]+)/data").expect("valid regex"));

/// Location named by a Google Maps link.
#[derive(Debug, Clone, PartialEq)]
pub enum MapsLocation {
    /// `.../maps/search/<lat>,<lng>`
    Coordinates(Coordinates),
    /// `.../maps/place/<name>/data=...`, with `+` decoded to spaces.
    Place(String),
}

/// Pull a point or place name out of a Google Maps URL.
#[must_use]
pub fn parse_maps_url(url: &str) -> Option<MapsLocation> {
    if let Some(caps) = MAPS_SEARCH.captures(url) {
        let lat = caps[1].parse().ok()?;
        let lng = caps[2].parse().ok()?;
        return Some(MapsLocation::Coordinates(Coordinates::new(lat, lng)));
    }
    let caps = MAPS_PLACE.captures(url)?;
    let name = caps[1].replace('+', " ");
    let name = name.trim();
    (!name.is_empty()).then(|| MapsLocation::Place(name.to_string()))
}

/// Gateway for `maps.googleapis.com/maps/api/geocode/json`.
pub struct GoogleGeocodingGateway {
    transport: Arc<dyn HttpTransport>,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl GoogleGeocodingGateway {
    /// Create a gateway against the public endpoint.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: impl Into<String>) -> Self {
        let defaults = GeocodingConfig::default();
        Self {
            transport,
            api_key: api_key.into(),
            base_url: defaults.base_url.clone(),
            timeout: defaults.timeout(),
        }
    }

    /// Build from configuration.
    ///
    /// # Errors
    /// Returns `LensError::Config` when no API key is configured.
    pub fn from_config(config: &GeocodingConfig, transport: Arc<dyn HttpTransport>) -> Result<Self, LensError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LensError::Config("geocoding.api_key is required".into()))?;
        Ok(Self {
            transport,
            api_key,
            base_url: config.base_url.clone(),
            timeout: config.timeout(),
        })
    }

    /// Point at a different endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the default timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request(&self, query: &ProviderQuery, timeout: Duration) -> ProviderResult<HttpRequest> {
        let request = HttpRequest::get(&self.base_url, timeout);
        let request = if let Some(address) = query.param(PARAM_ADDRESS).filter(|a| !a.trim().is_empty()) {
            request.with_query("address", address.trim())
        } else {
            let lat = parse_degrees(required_param(query, PARAM_LATITUDE)?, PARAM_LATITUDE)?;
            let lng = parse_degrees(required_param(query, PARAM_LONGITUDE)?, PARAM_LONGITUDE)?;
            request.with_query("latlng", format!("{lat:.6},{lng:.6}"))
        };
        Ok(request.with_query("key", &self.api_key))
    }
}

fn parse_degrees(raw: &str, name: &str) -> ProviderResult<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ProviderFailure::invalid_query(format!("{name} '{raw}' is not a number")))
}

/// Check the body has the shape of a geocode response.
///
/// Google reports quota and auth problems in-band with a 200 status; those
/// are upstream rejections and are classified like a non-2xx.
fn validate_body(body: &Value) -> ProviderResult<()> {
    if !body.is_object() {
        return Err(ProviderFailure::malformed("geocode response is not a JSON object"));
    }
    match body["status"].as_str() {
        None | Some("OK" | "ZERO_RESULTS") => {}
        Some(status) => {
            let message = body["error_message"].as_str().unwrap_or("no error_message");
            return Err(ProviderFailure::network(format!("geocode status {status}: {message}")));
        }
    }
    if !body["results"].is_array() {
        return Err(ProviderFailure::malformed("geocode response has no 'results' array"));
    }
    Ok(())
}

#[async_trait]
impl Gateway for GoogleGeocodingGateway {
    fn name(&self) -> &str {
        "google_geocoding"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Geocode
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&self, query: &ProviderQuery, timeout: Duration) -> ProviderResult {
        ensure_kind(self.name(), self.kind(), query)?;
        let request = self.build_request(query, timeout)?;
        let response = self.transport.execute(request).await?;
        let body = response.json()?;
        validate_body(&body)?;
        debug!(
            results = body["results"].as_array().map_or(0, Vec::len),
            "Geocode response received"
        );
        Ok(body)
    }
}
