//! Logging setup.
//!
//! Log lines go to stderr so stdout stays free for the host.

use tracing_subscriber::EnvFilter;

use crate::error::{ProviderError, Result};

/// Builds the level filter. `RUST_LOG` wins over `verbose`.
#[must_use]
pub fn env_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Installs the global subscriber, as plain text or JSON lines.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ProviderError::internal(format!("Failed to initialize logging: {e}")))
}
