//! Session priority bands

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority band of a policy session
///
/// Policies of a higher band (lower number) are evaluated before any policy of a
/// lower band, regardless of their order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[repr(u32)]
pub enum SessionPriority {
    Control = 1,
    PrivilegedTunnel = 2,
    High = 3,
    #[default]
    Default = 4,
    Low = 5,
}

impl SessionPriority {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(SessionPriority::Control),
            2 => Some(SessionPriority::PrivilegedTunnel),
            3 => Some(SessionPriority::High),
            4 => Some(SessionPriority::Default),
            5 => Some(SessionPriority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for SessionPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPriority::Control => "Control",
            SessionPriority::PrivilegedTunnel => "PrivilegedTunnel",
            SessionPriority::High => "High",
            SessionPriority::Default => "Default",
            SessionPriority::Low => "Low",
        };
        f.write_str(name)
    }
}
