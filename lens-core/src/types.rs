//! Core types shared by the gateways and the geocoding cache.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which upstream family a query is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Forward / reverse geocoding.
    Geocode,
    /// News articles about a location.
    News,
    /// Real-estate sales records.
    RealEstate,
    /// National park metadata.
    Parks,
    /// LLM completion.
    LlmComplete,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Geocode => "geocode",
            Self::News => "news",
            Self::RealEstate => "real_estate",
            Self::Parks => "parks",
            Self::LlmComplete => "llm_complete",
        };
        f.write_str(name)
    }
}

/// A query to an upstream provider.
///
/// Built with [`ProviderQuery::new`] + [`ProviderQuery::with_param`]; once
/// handed to a gateway there is no way to mutate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderQuery {
    kind: ProviderKind,
    parameters: BTreeMap<String, String>,
}

impl ProviderQuery {
    /// Start a query with no parameters.
    #[must_use]
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            parameters: BTreeMap::new(),
        }
    }

    /// Add (or replace) a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Which provider family this query targets.
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Look up a parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// All parameters, in key order.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }
}

/// Decimal places the cache keeps for coordinates.
pub const COORDINATE_PRECISION: u32 = 6;

const MICRO_DEGREES: f64 = 1_000_000.0;

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
}

impl Coordinates {
    /// Create a point (no range validation; upstream data is trusted as-is).
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build a point from integer micro-degrees, as stored in the cache.
    #[must_use]
    pub fn from_micro_degrees(lat_e6: i64, lon_e6: i64) -> Self {
        Self {
            latitude: lat_e6 as f64 / MICRO_DEGREES,
            longitude: lon_e6 as f64 / MICRO_DEGREES,
        }
    }

    /// The point as integer micro-degrees, rounded half away from zero.
    ///
    /// Two points that agree to six decimal places produce the same pair,
    /// which is what the cache indexes on.
    #[must_use]
    pub fn to_micro_degrees(self) -> (i64, i64) {
        (
            (self.latitude * MICRO_DEGREES).round() as i64,
            (self.longitude * MICRO_DEGREES).round() as i64,
        )
    }

    /// Whether both components are finite numbers.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// The point rounded to [`COORDINATE_PRECISION`] decimal places.
    #[must_use]
    pub fn rounded(self) -> Self {
        let (lat, lon) = self.to_micro_degrees();
        Self::from_micro_degrees(lat, lon)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// Normalize a place name for cache lookup: trimmed, lowercased, with
/// whitespace runs collapsed to a single space.
///
/// Returns `None` for names that are empty after trimming.
#[must_use]
pub fn normalize_place_name(name: &str) -> Option<String> {
    let normalized = name
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    (!normalized.is_empty()).then_some(normalized)
}

/// A geocoding result as persisted in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Store-assigned identifier. Callers should not depend on its value.
    pub id: i64,
    /// Coordinates key (rounded to six decimals).
    pub coordinates: Option<Coordinates>,
    /// Place-name key, as originally supplied.
    pub place_name: Option<String>,
    /// Verbatim upstream payload.
    pub raw_response: Option<String>,
    /// When the record was first written.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Parse the cached upstream payload, if any.
    ///
    /// # Errors
    /// Returns the JSON error if the stored text is not valid JSON.
    pub fn payload(&self) -> Option<Result<serde_json::Value, serde_json::Error>> {
        self.raw_response.as_deref().map(serde_json::from_str)
    }
}

/// Fields to write into the cache. Any `None` field keeps the value an
/// existing record already has.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEntry {
    /// Coordinates key.
    pub coordinates: Option<Coordinates>,
    /// Place-name key.
    pub place_name: Option<String>,
    /// Upstream payload.
    pub raw_response: Option<String>,
}

impl CacheEntry {
    /// Normalized place-name key, if a non-blank name is present.
    #[must_use]
    pub fn place_key(&self) -> Option<String> {
        self.place_name.as_deref().and_then(normalize_place_name)
    }

    /// Whether at least one lookup key is populated.
    #[must_use]
    pub fn has_key(&self) -> bool {
        self.coordinates.is_some() || self.place_key().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_names_normalize_case_and_whitespace() {
        assert_eq!(
            normalize_place_name("  Danvers   State\tHospital \n").as_deref(),
            Some("danvers state hospital")
        );
        assert_eq!(normalize_place_name("   "), None);
    }

    #[test]
    fn coordinates_round_to_six_places() {
        let point = Coordinates::new(42.960_773_4, -74.250_663_6);
        assert_eq!(point.to_micro_degrees(), (42_960_773, -74_250_664));
        assert_eq!(point.rounded().to_micro_degrees(), point.to_micro_degrees());
    }

    #[test]
    fn query_parameters_are_readable() {
        let query = ProviderQuery::new(ProviderKind::News)
            .with_param("q", "Danvers")
            .with_param("q", "Salem");
        assert_eq!(query.kind(), ProviderKind::News);
        assert_eq!(query.param("q"), Some("Salem"));
        assert_eq!(query.param("missing"), None);
    }

    #[test]
    fn entry_key_requires_non_blank_name() {
        let entry = CacheEntry {
            place_name: Some("  ".into()),
            ..CacheEntry::default()
        };
        assert!(!entry.has_key());
    }
}
