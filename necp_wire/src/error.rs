//! Wire decoding errors

use core_types::NecpError;
use thiserror::Error;

/// Errors produced while decoding NECP wire data
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    /// Fewer bytes than the field requires
    #[error("Truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// A TLV's value does not fit its type
    #[error("Invalid TLV {tlv_type}: {reason}")]
    InvalidTlv { tlv_type: u8, reason: String },

    /// A required TLV is absent
    #[error("Missing TLV {0}")]
    MissingTlv(u8),

    #[error("Unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("Unknown condition type {0}")]
    UnknownCondition(u8),

    #[error("Unknown result type {0}")]
    UnknownResult(u8),

    #[error("Unknown route rule action {0}")]
    UnknownRouteRule(u8),

    #[error("Invalid string: {0}")]
    InvalidString(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid statistics: {0}")]
    InvalidStatistics(String),
}

impl WireError {
    pub(crate) fn invalid(tlv_type: u8, reason: impl Into<String>) -> Self {
        WireError::InvalidTlv {
            tlv_type,
            reason: reason.into(),
        }
    }
}

impl From<WireError> for NecpError {
    fn from(error: WireError) -> Self {
        match error {
            WireError::UnknownPacketType(_) => NecpError::UnknownPacketType,
            WireError::UnknownCondition(_) => NecpError::PolicyConditionsInvalid,
            WireError::UnknownResult(_) => NecpError::PolicyResultInvalid,
            WireError::UnknownRouteRule(_) => NecpError::RouteRulesInvalid,
            _ => NecpError::InvalidTlv,
        }
    }
}
