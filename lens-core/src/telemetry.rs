//! Tracing subscriber setup for binaries and integration harnesses.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::GeneralConfig;
use crate::error::{LensError, Result};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `general.log_level` when set. With
/// `general.json_logs` events are emitted as one JSON object per line.
///
/// # Errors
/// Returns `LensError::Config` if the filter is invalid or a global
/// subscriber is already installed.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| LensError::Config(format!("invalid log level '{}': {e}", config.log_level)))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json_logs {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    installed.map_err(|e| LensError::Config(format!("failed to install tracing subscriber: {e}")))?;

    tracing::info!(level = %config.log_level, json = config.json_logs, "Tracing initialized");
    Ok(())
}
