//! # Policy Sessions
//!
//! This crate is the control-protocol front end: it answers session packets
//! and owns the lifecycle of the shared NECP context.
//!
//! ## Philosophy
//!
//! - **One request, one response**: every packet with a readable header is
//!   answered, with an ERROR TLV when the command fails
//! - **Typed past the boundary**: packets become [`necp_wire::Command`] values
//!   before anything touches the store
//! - **Explicit context**: the store and registry live in a [`NecpContext`]
//!   passed by `Arc`, never in globals
//!
//! ## Key Types
//!
//! - [`PolicySession`]: one control session and its dispatcher
//! - [`NecpContext`]: store, client registry and collaborators
//! - [`NecpHost`]: creates and releases the context as sessions come and go

pub mod context;
pub mod host;
pub mod session;

pub use context::{NecpConfig, NecpContext};
pub use host::{HostError, NecpHost};
pub use session::{dump_entries, PolicySession};
