//! # UrbanLens Core
//!
//! External-data gateway layer for UrbanLens.
//!
//! Everything UrbanLens learns about a place comes from a third-party API.
//! This crate puts one contract in front of all of them:
//!
//! - **Gateways** ([`gateway`]): one adapter per upstream (Google
//!   geocoding, news, Connecticut real-estate sales, NPS parks). Each turns
//!   a [`ProviderQuery`] into a single HTTP exchange and returns a
//!   [`ProviderResult`].
//! - **Transport** ([`http`]): the HTTP seam. Production uses `reqwest`;
//!   tests script responses with [`mock::ScriptedTransport`].
//! - **Geocoding cache** ([`cache`]): SQLite-backed cache-aside in front of
//!   the geocoder, keyed by six-decimal coordinates or normalized place name.
//! - **Retry** ([`retry`]): optional caller-side backoff for `Network`
//!   failures. Gateways themselves never retry.
//!
//! The LLM providers live in `lens-llm` and implement the same
//! [`gateway::Gateway`] trait.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod mock;
pub mod retry;
pub mod telemetry;
pub mod types;

pub use cache::{CacheStore, GeocodeRequest, GeocodingCache, SqliteCacheStore};
pub use config::LensConfig;
pub use error::{ErrorKind, LensError, ProviderFailure, ProviderResult};
pub use gateway::{Gateway, GatewayRegistry};
pub use http::{HttpTransport, ReqwestTransport};
pub use retry::RetryPolicy;
pub use types::*;
