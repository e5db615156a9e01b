//! Daemon configuration
//!
//! Read from a JSON file; every field has a default, so `{}` is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use services_client_registry::RegistryLimits;
use services_policy_session::NecpConfig;
use sim_kernel::SimConfig;
use std::path::Path;

use crate::runtime::HostRuntimeError;

/// Pid the daemon's control session runs as unless configured
pub const DEFAULT_DAEMON_PID: i32 = 1;

/// Pid the script's client channel runs as unless configured
pub const DEFAULT_CLIENT_PID: i32 = 100;

/// Contents of the `--config` file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NecpdConfig {
    /// `EnvFilter` directive, such as `info` or `policy=debug`
    pub log_level: String,
    pub json_logs: bool,
    pub limits: RegistryLimits,
    pub daemon_pid: i32,
    pub client_pid: i32,
    /// Processes, interfaces and agents the simulated kernel starts with
    pub kernel: SimConfig,
}

impl Default for NecpdConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            limits: RegistryLimits::default(),
            daemon_pid: DEFAULT_DAEMON_PID,
            client_pid: DEFAULT_CLIENT_PID,
            kernel: SimConfig::default(),
        }
    }
}

impl NecpdConfig {
    pub fn from_json(text: &str) -> Result<Self, HostRuntimeError> {
        serde_json::from_str(text).map_err(|e| HostRuntimeError::ConfigError(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, HostRuntimeError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            HostRuntimeError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn necp(&self) -> NecpConfig {
        NecpConfig {
            limits: self.limits,
        }
    }
}
