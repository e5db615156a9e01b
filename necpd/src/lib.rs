//! # NECP Host Daemon
//!
//! This crate drives the NECP control plane from a command script.
//!
//! ## Philosophy
//!
//! - **Host owns I/O**: the runtime returns output lines; only `main` prints
//! - **Real packets**: policy commands are encoded, dispatched and decoded
//!   exactly as a control agent's would be
//! - **Deterministic**: the kernel is simulated and configured up front
//!
//! ## Responsibilities
//!
//! The daemon:
//! - Loads a JSON configuration and installs the log subscriber
//! - Boots a simulated kernel with the configured processes, interfaces and agents
//! - Opens one control session and one client channel
//! - Runs each script line and reports the outcome

pub mod commands;
pub mod config;
pub mod logging;
pub mod runtime;
pub mod script;

pub use commands::{ScriptCommand, ScriptCommandError, ScriptCommandParser};
pub use config::NecpdConfig;
pub use logging::init_logging;
pub use runtime::{format_response, HostRuntime, HostRuntimeConfig, HostRuntimeError};
pub use script::{Script, ScriptError, ScriptLine};
