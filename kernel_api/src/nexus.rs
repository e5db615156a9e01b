//! Nexus providers

use crate::KernelError;
use core_types::{ClientId, Pid};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request for a nexus instance on behalf of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NexusRequest {
    pub client: ClientId,
    pub pid: Pid,
    /// Agent that provides the nexus
    pub agent: Uuid,
}

/// A nexus instance and port assigned to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NexusInstance {
    pub instance: Uuid,
    pub port: u16,
}

/// Provider side of nexus assignment
///
/// `request_instance` only queues the request. The assignment comes back later
/// through the client registry.
pub trait NexusProvider: Send + Sync {
    fn request_instance(&self, request: NexusRequest) -> Result<(), KernelError>;
}
