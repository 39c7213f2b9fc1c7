//! Error types for the UrbanLens gateway layer.
//!
//! Two levels:
//! - [`ProviderFailure`] is the `Failed(kind, detail)` half of a
//!   [`ProviderResult`]. Every gateway funnels its failures into it so
//!   callers can tell a flaky network from a garbled payload.
//! - [`LensError`] covers everything else the core can hit (SQLite,
//!   configuration, I/O) and wraps provider failures when they bubble up
//!   through the cache orchestrator.

use std::fmt;

use thiserror::Error;

/// Classification of a failed external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport failure, timeout, rate limit or non-2xx status.
    Network,
    /// A 2xx response whose body could not be interpreted.
    MalformedResponse,
    /// A prompt could not be fit into the token budget.
    BudgetExceeded,
    /// Cache miss with no fallback path.
    NotFound,
    /// The caller supplied a query the gateway cannot dispatch.
    InvalidQuery,
}

impl ErrorKind {
    /// Whether retrying the same call could plausibly succeed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network)
    }

    /// Stable lowercase name, used in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::MalformedResponse => "malformed_response",
            Self::BudgetExceeded => "budget_exceeded",
            Self::NotFound => "not_found",
            Self::InvalidQuery => "invalid_query",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The failure arm of a [`ProviderResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct ProviderFailure {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Human-readable detail (status line, parse error, ...).
    pub detail: String,
}

impl ProviderFailure {
    /// Build a failure of an arbitrary kind.
    #[must_use]
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Transport / status failure.
    #[must_use]
    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, detail)
    }

    /// Unparseable 2xx payload.
    #[must_use]
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, detail)
    }

    /// Prompt does not fit the token budget.
    #[must_use]
    pub fn budget_exceeded(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::BudgetExceeded, detail)
    }

    /// Nothing cached and nothing to fall back to.
    #[must_use]
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    /// Query rejected before dispatch.
    #[must_use]
    pub fn invalid_query(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidQuery, detail)
    }

    /// Whether the caller may retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Outcome of a single gateway call.
pub type ProviderResult<T = serde_json::Value> = std::result::Result<T, ProviderFailure>;

/// Top-level error type for the core crate.
#[derive(Error, Debug)]
pub enum LensError {
    /// An upstream provider call failed.
    #[error("Provider call failed: {0}")]
    Provider(#[from] ProviderFailure),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A cache entry carried neither coordinates nor a place name.
    #[error("Cache entry has no lookup key (needs coordinates or a place name)")]
    MissingKey,

    /// Upstream payload too large for the cache column.
    #[error("Raw response too large to cache: {len} chars (limit: {limit})")]
    PayloadTooLarge {
        /// Payload length in characters.
        len: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LensError {
    /// The provider failure kind, if this error came from a gateway.
    #[must_use]
    pub fn provider_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Provider(failure) => Some(failure.kind),
            _ => None,
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, LensError>;
