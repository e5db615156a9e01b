//! # Client Registry
//!
//! This crate tracks NECP flow clients: processes open channels, register
//! clients through them, and read back each client's routing result.
//!
//! ## Philosophy
//!
//! - **Results are cached, never trusted blindly**: a result is reused only while
//!   the policy and interface generations it was computed against are current
//! - **No lock is held across a collaborator call**: evaluation, agent requests
//!   and nexus requests all run with the registry unlocked
//! - **Clients belong to their channel**: only an observer channel may see
//!   another channel's clients, and only to read them
//!
//! ## Key Types
//!
//! - [`ClientRegistry`]: channels, clients and their cached results
//! - [`ChannelFlags`]: options a process passes when opening a channel
//! - [`ClientState`]: where a client is in its lifecycle
//! - [`ClientError`]: why a client action failed

pub mod client;
pub mod error;
pub mod registry;

pub use client::{Channel, ChannelFlags, ClientState};
pub use error::ClientError;
pub use registry::{ClientRegistry, RegistryLimits, MAX_PARAMETERS_LEN, MAX_RESULT_LEN};
