//! Kernel error types

use core_types::Pid;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when interacting with a collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KernelError {
    /// No live process with this pid
    #[error("Process not found: {0}")]
    ProcessNotFound(Pid),

    #[error("Interface not found: {0}")]
    InterfaceNotFound(u32),

    #[error("Network agent not found: {0}")]
    AgentNotFound(Uuid),

    /// No nexus provider serves the requested agent
    #[error("No nexus provider for agent {0}")]
    NoNexusProvider(Uuid),

    /// The collaborator refused the request
    #[error("Request rejected: {0}")]
    RequestRejected(String),
}
