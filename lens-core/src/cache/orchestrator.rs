//! Cache-aside geocoding: look in the store, fall back to the gateway,
//! write back what the gateway returned.
//!
//! Lookup order is coordinates first, then place name. A hit never
//! touches the network. A miss costs exactly one upstream call; results
//! with no geocode matches are handed back but not cached, so a later
//! request can try again.
//!
//! Two concurrent misses for the same key both reach upstream unless
//! `dedupe_in_flight` is enabled, in which case the second waits for the
//! first and is answered from the cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::cache::store::{CacheStore, RequestedKey};
use crate::config::CacheConfig;
use crate::error::{LensError, ProviderFailure, Result};
use crate::gateway::Gateway;
use crate::gateway::geocoding::{
    MapsLocation, coordinates_query, first_formatted_address, first_result_coordinates,
    has_results, parse_maps_url, place_query,
};
use crate::types::{CacheEntry, CacheRecord, Coordinates, normalize_place_name};

/// What the caller wants geocoded. At least one field must be set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeRequest {
    /// Point to reverse-geocode.
    pub coordinates: Option<Coordinates>,
    /// Place to forward-geocode.
    pub place_name: Option<String>,
}

impl GeocodeRequest {
    /// Forward geocode a place name.
    #[must_use]
    pub fn place(name: impl Into<String>) -> Self {
        Self {
            coordinates: None,
            place_name: Some(name.into()),
        }
    }

    /// Reverse geocode a point.
    #[must_use]
    pub fn point(coordinates: Coordinates) -> Self {
        Self {
            coordinates: Some(coordinates),
            place_name: None,
        }
    }

    fn place_key(&self) -> Option<String> {
        self.place_name.as_deref().and_then(normalize_place_name)
    }

    /// Reject points the store would silently round to garbage.
    fn validate(&self) -> Result<()> {
        match self.coordinates {
            Some(point) if !point.is_finite() => {
                Err(ProviderFailure::invalid_query(format!("coordinates {point} are not finite")).into())
            }
            _ => Ok(()),
        }
    }

    /// Key used to serialize concurrent fetches.
    fn flight_key(&self) -> Option<String> {
        match (self.coordinates, self.place_key()) {
            (Some(point), _) => Some(format!("@{}", point.rounded())),
            (None, Some(key)) => Some(key),
            (None, None) => None,
        }
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Served from the store; no upstream call.
    Cache,
    /// Fetched from the gateway during this call.
    Upstream,
}

/// Result of [`GeocodingCache::geocode`].
#[derive(Debug, Clone)]
pub struct GeocodeOutcome {
    /// Parsed upstream payload (`null` for a cached record without one).
    pub payload: Value,
    /// The stored record. `None` when the result was not cached.
    pub record: Option<CacheRecord>,
    /// Cache hit or upstream fetch.
    pub source: CacheSource,
}

impl GeocodeOutcome {
    /// Whether this was a cache hit.
    #[must_use]
    pub fn is_hit(&self) -> bool {
        self.source == CacheSource::Cache
    }
}

/// Cache-aside front for a geocoding gateway.
pub struct GeocodingCache {
    store: Arc<dyn CacheStore>,
    gateway: Arc<dyn Gateway>,
    timeout: Duration,
    in_flight: Option<DashMap<String, Arc<AsyncMutex<()>>>>,
}

impl std::fmt::Debug for GeocodingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodingCache")
            .field("gateway", &self.gateway.name())
            .field("timeout", &self.timeout)
            .field("dedupe_in_flight", &self.in_flight.is_some())
            .finish_non_exhaustive()
    }
}

impl GeocodingCache {
    /// Wrap `gateway` with `store`, using the gateway's default timeout.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, gateway: Arc<dyn Gateway>) -> Self {
        let timeout = gateway.default_timeout();
        Self {
            store,
            gateway,
            timeout,
            in_flight: None,
        }
    }

    /// Build with the cache settings from configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig, store: Arc<dyn CacheStore>, gateway: Arc<dyn Gateway>) -> Self {
        Self::new(store, gateway).with_in_flight_dedupe(config.dedupe_in_flight)
    }

    /// Override the upstream timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Serialize concurrent misses for the same key.
    #[must_use]
    pub fn with_in_flight_dedupe(mut self, enabled: bool) -> Self {
        self.in_flight = enabled.then(DashMap::new);
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Cache-only lookup.
    ///
    /// # Errors
    /// `InvalidQuery` for non-finite coordinates, `NotFound` on a miss,
    /// storage failures otherwise.
    pub fn lookup(&self, request: &GeocodeRequest) -> Result<CacheRecord> {
        request.validate()?;
        self.store
            .lookup(request.coordinates, request.place_name.as_deref())?
            .ok_or_else(|| {
                LensError::Provider(ProviderFailure::not_found(format!(
                    "no cached geocode for {}",
                    describe(request)
                )))
            })
    }

    /// Resolve `request`, consulting the cache before the gateway.
    ///
    /// # Errors
    /// `InvalidQuery` when the request has no key or non-finite
    /// coordinates, the gateway's failure on a miss, storage failures on
    /// lookup.
    pub async fn geocode(&self, request: &GeocodeRequest) -> Result<GeocodeOutcome> {
        request.validate()?;
        let Some(flight_key) = request.flight_key() else {
            return Err(ProviderFailure::invalid_query("geocode request needs coordinates or a place name").into());
        };

        if let Some(hit) = self.cached(request)? {
            return Ok(hit);
        }

        let Some(in_flight) = &self.in_flight else {
            return self.fetch_and_store(request).await;
        };

        let lock = in_flight.entry(flight_key.clone()).or_default().clone();
        let outcome = {
            let _guard = lock.lock().await;
            match self.cached(request)? {
                Some(hit) => Ok(hit),
                None => self.fetch_and_store(request).await,
            }
        };
        drop(lock);
        in_flight.remove_if(&flight_key, |_, lock| Arc::strong_count(lock) == 1);
        outcome
    }

    /// Skip the cache, fetch from upstream and overwrite what is stored.
    ///
    /// # Errors
    /// `InvalidQuery` when the request has no usable key, or the gateway's
    /// failure.
    pub async fn refresh(&self, request: &GeocodeRequest) -> Result<GeocodeOutcome> {
        request.validate()?;
        if request.flight_key().is_none() {
            return Err(ProviderFailure::invalid_query("geocode request needs coordinates or a place name").into());
        }
        self.fetch_and_store(request).await
    }

    /// Formatted address for a point, if upstream knows one.
    ///
    /// # Errors
    /// See [`GeocodingCache::geocode`].
    pub async fn place_name_for(&self, point: Coordinates) -> Result<Option<String>> {
        let outcome = self.geocode(&GeocodeRequest::point(point)).await?;
        Ok(first_formatted_address(&outcome.payload))
    }

    /// Coordinates of the best match for a place name.
    ///
    /// # Errors
    /// See [`GeocodingCache::geocode`].
    pub async fn coordinates_for(&self, place_name: &str) -> Result<Option<Coordinates>> {
        let outcome = self.geocode(&GeocodeRequest::place(place_name)).await?;
        Ok(first_result_coordinates(&outcome.payload))
    }

    /// Coordinates for a Google Maps link. Search links carry the point
    /// directly; place links are forward geocoded.
    ///
    /// # Errors
    /// See [`GeocodingCache::geocode`].
    pub async fn coordinates_from_maps_url(&self, url: &str) -> Result<Option<Coordinates>> {
        match parse_maps_url(url) {
            Some(MapsLocation::Coordinates(point)) => Ok(Some(point)),
            Some(MapsLocation::Place(name)) => self.coordinates_for(&name).await,
            None => {
                debug!(url, "Unrecognized maps URL");
                Ok(None)
            }
        }
    }

    /// Cache hit with a parseable payload. Records holding corrupt JSON
    /// are deleted and reported as a miss.
    fn cached(&self, request: &GeocodeRequest) -> Result<Option<GeocodeOutcome>> {
        let Some(record) = self
            .store
            .lookup(request.coordinates, request.place_name.as_deref())?
        else {
            debug!(key = %describe(request), "Geocode cache miss");
            return Ok(None);
        };

        let payload = match record.payload() {
            None => Value::Null,
            Some(Ok(payload)) => payload,
            Some(Err(e)) => {
                warn!(id = record.id, error = %e, "Cached geocode is not valid JSON, discarding");
                self.store.delete(record.id)?;
                return Ok(None);
            }
        };

        debug!(id = record.id, key = %describe(request), "Geocode cache hit");
        Ok(Some(GeocodeOutcome {
            payload,
            record: Some(record),
            source: CacheSource::Cache,
        }))
    }

    async fn fetch_and_store(&self, request: &GeocodeRequest) -> Result<GeocodeOutcome> {
        let start = Instant::now();
        let (query, requested) = match (request.coordinates, request.place_name.as_deref()) {
            (Some(point), _) => (coordinates_query(point), RequestedKey::Coordinates),
            (None, Some(name)) => (place_query(name), RequestedKey::PlaceName),
            (None, None) => {
                return Err(ProviderFailure::invalid_query("geocode request needs coordinates or a place name").into());
            }
        };

        let payload = match self.gateway.send(&query, self.timeout).await {
            Ok(payload) => payload,
            Err(failure) => {
                warn!(
                    gateway = self.gateway.name(),
                    kind = %failure.kind,
                    detail = %failure.detail,
                    "Geocode upstream call failed"
                );
                return Err(failure.into());
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        if !has_results(&payload) {
            info!(key = %describe(request), elapsed_ms, "Geocode returned no results, not caching");
            return Ok(GeocodeOutcome {
                payload,
                record: None,
                source: CacheSource::Upstream,
            });
        }

        let entry = CacheEntry {
            coordinates: request.coordinates.or_else(|| first_result_coordinates(&payload)),
            place_name: request
                .place_name
                .clone()
                .or_else(|| first_formatted_address(&payload)),
            raw_response: Some(payload.to_string()),
        };

        let record = match self.store.store_keyed(entry, requested) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key = %describe(request), error = %e, "Geocode result not cached");
                None
            }
        };

        info!(
            key = %describe(request),
            cached = record.is_some(),
            elapsed_ms,
            "Geocode fetched from upstream"
        );
        Ok(GeocodeOutcome {
            payload,
            record,
            source: CacheSource::Upstream,
        })
    }
}

fn describe(request: &GeocodeRequest) -> String {
    match (request.coordinates, &request.place_name) {
        (Some(point), Some(name)) => format!("{point} / {name}"),
        (Some(point), None) => point.to_string(),
        (None, Some(name)) => name.clone(),
        (None, None) => "<empty>".to_string(),
    }
}
