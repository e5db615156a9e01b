//! Log subscriber setup for the daemon binary

use tracing_subscriber::EnvFilter;

use crate::runtime::HostRuntimeError;

/// Builds the filter: `RUST_LOG` wins over the configured level
pub fn log_filter(level: &str) -> Result<EnvFilter, HostRuntimeError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| HostRuntimeError::ConfigError(format!("log level {:?}: {}", level, e)))
}

/// Installs the global subscriber. Logs go to stderr so script output on
/// stdout stays clean.
pub fn init_logging(level: &str, json: bool) -> Result<(), HostRuntimeError> {
    let filter = log_filter(level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| HostRuntimeError::ConfigError(format!("log subscriber: {}", e)))
}
