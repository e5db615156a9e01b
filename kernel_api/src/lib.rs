//! # Kernel API
//!
//! This crate defines the interface between the NECP subsystem and the rest of the
//! kernel it lives in.
//!
//! ## Philosophy
//!
//! NECP decides; it does not own the things it decides about:
//! - Process identity comes from a credential source
//! - Interfaces come from the interface table
//! - Agents and nexus providers answer requests asynchronously
//!
//! Every collaborator is a trait so the whole subsystem can run against a
//! simulated kernel in tests.
//!
//! ## Design Goals
//!
//! 1. **Testability**: every collaborator can be mocked
//! 2. **Request/notify**: nothing here blocks waiting for an answer
//! 3. **Lock freedom at the seam**: callers never hold their own locks across a
//!    collaborator call

pub mod agents;
pub mod credentials;
pub mod error;
pub mod interfaces;
pub mod nexus;

pub use agents::{AgentAction, AgentRequest, NetAgentFlags, NetAgentInfo, NetworkAgents};
pub use credentials::{Credentials, ProcessCredentials, MATCH_ENTITLEMENT};
pub use error::KernelError;
pub use interfaces::{InterfaceDetails, InterfaceFlags, InterfaceTable};
pub use nexus::{NexusInstance, NexusProvider, NexusRequest};

use std::sync::Arc;

/// The full set of collaborators the NECP subsystem talks to
#[derive(Clone)]
pub struct Collaborators {
    pub credentials: Arc<dyn ProcessCredentials>,
    pub interfaces: Arc<dyn InterfaceTable>,
    pub agents: Arc<dyn NetworkAgents>,
    pub nexus: Arc<dyn NexusProvider>,
}

impl Collaborators {
    pub fn new(
        credentials: Arc<dyn ProcessCredentials>,
        interfaces: Arc<dyn InterfaceTable>,
        agents: Arc<dyn NetworkAgents>,
        nexus: Arc<dyn NexusProvider>,
    ) -> Self {
        Self {
            credentials,
            interfaces,
            agents,
            nexus,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
