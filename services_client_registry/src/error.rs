//! Client action errors

use core_types::{ChannelId, ClientId};
use kernel_api::KernelError;
use necp_wire::WireError;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by client actions
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// Parameters are oversized or malformed
    #[error("Bad parameters: {0}")]
    BadParams(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    /// No such client, or the client belongs to another channel
    #[error("Client not found: {0}")]
    ClientNotFound(ClientId),

    /// The encoded result does not fit the caller's buffer
    #[error("Result truncated: needed {needed} bytes, {available} available")]
    ResultTruncated { needed: usize, available: usize },

    #[error("Invalid statistics: {0}")]
    InvalidStatistics(String),

    #[error("Network agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Interface not found: {0}")]
    InterfaceNotFound(u32),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] KernelError),
}

impl From<WireError> for ClientError {
    fn from(error: WireError) -> Self {
        match error {
            WireError::InvalidStatistics(reason) => ClientError::InvalidStatistics(reason),
            other => ClientError::BadParams(other.to_string()),
        }
    }
}
