//! Persistent geocoding cache.
//!
//! [`store`] owns the SQLite table; [`orchestrator`] puts it in front of a
//! geocoding gateway.

pub mod orchestrator;
pub mod store;

pub use orchestrator::{CacheSource, GeocodeOutcome, GeocodeRequest, GeocodingCache};
pub use store::{CacheStore, RequestedKey, SqliteCacheStore};
