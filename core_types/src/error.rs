//! Protocol error kinds

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported to a session in an ERROR TLV
///
/// Discriminants are the wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[repr(u32)]
pub enum NecpError {
    #[error("Internal error")]
    Internal = 0,

    #[error("Unknown packet type")]
    UnknownPacketType = 1,

    #[error("Invalid TLV")]
    InvalidTlv = 2,

    #[error("Policy result invalid")]
    PolicyResultInvalid = 3,

    #[error("Policy conditions invalid")]
    PolicyConditionsInvalid = 4,

    #[error("Policy id not found")]
    PolicyIdNotFound = 5,

    #[error("Invalid process")]
    InvalidProcess = 6,

    #[error("Route rules invalid")]
    RouteRulesInvalid = 7,
}

impl NecpError {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        let error = match code {
            0 => NecpError::Internal,
            1 => NecpError::UnknownPacketType,
            2 => NecpError::InvalidTlv,
            3 => NecpError::PolicyResultInvalid,
            4 => NecpError::PolicyConditionsInvalid,
            5 => NecpError::PolicyIdNotFound,
            6 => NecpError::InvalidProcess,
            7 => NecpError::RouteRulesInvalid,
            _ => return None,
        };
        Some(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(NecpError::Internal.code(), 0);
        assert_eq!(NecpError::RouteRulesInvalid.code(), 7);
        assert_eq!(NecpError::from_code(5), Some(NecpError::PolicyIdNotFound));
        assert_eq!(NecpError::from_code(8), None);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(NecpError::InvalidTlv.to_string(), "Invalid TLV");
    }

    #[test]
    fn test_error_serde() {
        let json = serde_json::to_string(&NecpError::InvalidProcess).unwrap();
        let back: NecpError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NecpError::InvalidProcess);
    }
}
