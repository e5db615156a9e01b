//! Policy conditions
//!
//! A condition is one predicate over a client's attributes. Policies carry a set
//! of conditions and match only when all of them hold.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

bitflags! {
    /// Per-condition flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ConditionFlags: u8 {
        /// Inverts the match result of the condition
        const NEGATIVE = 0x01;
    }
}

/// Address with a prefix length, for subnet conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressPrefix {
    pub address: SocketAddr,
    pub prefix: u8,
}

impl AddressPrefix {
    pub fn new(address: SocketAddr, prefix: u8) -> Self {
        Self { address, prefix }
    }

    /// Returns true if `candidate` falls inside this prefix.
    ///
    /// Families must agree. A non-zero port on the prefix address must match too.
    pub fn contains(&self, candidate: &SocketAddr) -> bool {
        if self.address.port() != 0 && self.address.port() != candidate.port() {
            return false;
        }
        match (self.address.ip(), candidate.ip()) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                prefix_equal(&net.octets(), &addr.octets(), self.prefix)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                prefix_equal(&net.octets(), &addr.octets(), self.prefix)
            }
            _ => false,
        }
    }
}

/// Inclusive address interval, for range conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRange {
    pub start: SocketAddr,
    pub end: SocketAddr,
}

impl AddressRange {
    pub fn new(start: SocketAddr, end: SocketAddr) -> Self {
        Self { start, end }
    }

    /// Returns true if `candidate` lies within `[start, end]` of the same family
    pub fn contains(&self, candidate: &SocketAddr) -> bool {
        match (self.start.ip(), self.end.ip(), candidate.ip()) {
            (IpAddr::V4(start), IpAddr::V4(end), IpAddr::V4(addr)) => {
                start.octets() <= addr.octets() && addr.octets() <= end.octets()
            }
            (IpAddr::V6(start), IpAddr::V6(end), IpAddr::V6(addr)) => {
                start.octets() <= addr.octets() && addr.octets() <= end.octets()
            }
            _ => false,
        }
    }
}

fn prefix_equal(network: &[u8], address: &[u8], prefix: u8) -> bool {
    let bits = (prefix as usize).min(network.len() * 8);
    let whole = bits / 8;
    if network[..whole] != address[..whole] {
        return false;
    }
    let rest = bits % 8;
    if rest == 0 {
        return true;
    }
    let mask = 0xffu8 << (8 - rest);
    network[whole] & mask == address[whole] & mask
}

/// A single policy condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Condition {
    /// Matches everything; not valid alongside any other condition
    Default,
    /// Effective application uuid
    Application(Uuid),
    /// Real application uuid; only valid together with `Application`
    RealApplication(Uuid),
    /// Host domain, such as `apple.com`
    Domain(String),
    Account(String),
    /// Entitlement held by the owning process
    Entitlement(String),
    Pid(i32),
    Uid(u32),
    AllInterfaces,
    BoundInterface(String),
    TrafficClassRange { start: u32, end: u32 },
    IpProtocol(u8),
    LocalAddr(AddressPrefix),
    RemoteAddr(AddressPrefix),
    LocalAddrRange(AddressRange),
    RemoteAddrRange(AddressRange),
}

impl Condition {
    pub const CODE_DEFAULT: u8 = 0;
    pub const CODE_APPLICATION: u8 = 1;
    pub const CODE_REAL_APPLICATION: u8 = 2;
    pub const CODE_DOMAIN: u8 = 3;
    pub const CODE_ACCOUNT: u8 = 4;
    pub const CODE_ENTITLEMENT: u8 = 5;
    pub const CODE_PID: u8 = 6;
    pub const CODE_UID: u8 = 7;
    pub const CODE_ALL_INTERFACES: u8 = 8;
    pub const CODE_BOUND_INTERFACE: u8 = 9;
    pub const CODE_TRAFFIC_CLASS: u8 = 10;
    pub const CODE_IP_PROTOCOL: u8 = 11;
    pub const CODE_LOCAL_ADDR: u8 = 12;
    pub const CODE_REMOTE_ADDR: u8 = 13;
    pub const CODE_LOCAL_ADDR_RANGE: u8 = 14;
    pub const CODE_REMOTE_ADDR_RANGE: u8 = 15;

    /// Returns the wire code for this condition kind
    pub fn code(&self) -> u8 {
        match self {
            Condition::Default => Self::CODE_DEFAULT,
            Condition::Application(_) => Self::CODE_APPLICATION,
            Condition::RealApplication(_) => Self::CODE_REAL_APPLICATION,
            Condition::Domain(_) => Self::CODE_DOMAIN,
            Condition::Account(_) => Self::CODE_ACCOUNT,
            Condition::Entitlement(_) => Self::CODE_ENTITLEMENT,
            Condition::Pid(_) => Self::CODE_PID,
            Condition::Uid(_) => Self::CODE_UID,
            Condition::AllInterfaces => Self::CODE_ALL_INTERFACES,
            Condition::BoundInterface(_) => Self::CODE_BOUND_INTERFACE,
            Condition::TrafficClassRange { .. } => Self::CODE_TRAFFIC_CLASS,
            Condition::IpProtocol(_) => Self::CODE_IP_PROTOCOL,
            Condition::LocalAddr(_) => Self::CODE_LOCAL_ADDR,
            Condition::RemoteAddr(_) => Self::CODE_REMOTE_ADDR,
            Condition::LocalAddrRange(_) => Self::CODE_LOCAL_ADDR_RANGE,
            Condition::RemoteAddrRange(_) => Self::CODE_REMOTE_ADDR_RANGE,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Condition::Default)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Default => write!(f, "Default"),
            Condition::Application(uuid) => write!(f, "Application ({})", uuid),
            Condition::RealApplication(uuid) => write!(f, "RealApplication ({})", uuid),
            Condition::Domain(domain) => write!(f, "Domain ({})", domain),
            Condition::Account(account) => write!(f, "Account ({})", account),
            Condition::Entitlement(name) => write!(f, "Entitlement ({})", name),
            Condition::Pid(pid) => write!(f, "Pid ({})", pid),
            Condition::Uid(uid) => write!(f, "Uid ({})", uid),
            Condition::AllInterfaces => write!(f, "AllInterfaces"),
            Condition::BoundInterface(name) => write!(f, "BoundInterface ({})", name),
            Condition::TrafficClassRange { start, end } => {
                write!(f, "TrafficClass ({}-{})", start, end)
            }
            Condition::IpProtocol(proto) => write!(f, "IpProtocol ({})", proto),
            Condition::LocalAddr(p) => write!(f, "LocalAddr ({}/{})", p.address, p.prefix),
            Condition::RemoteAddr(p) => write!(f, "RemoteAddr ({}/{})", p.address, p.prefix),
            Condition::LocalAddrRange(r) => write!(f, "LocalAddrRange ({}-{})", r.start, r.end),
            Condition::RemoteAddrRange(r) => {
                write!(f, "RemoteAddrRange ({}-{})", r.start, r.end)
            }
        }
    }
}

/// A condition together with its flags, as carried by a policy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyCondition {
    pub condition: Condition,
    #[serde(default)]
    pub flags: ConditionFlags,
}

impl PolicyCondition {
    /// Creates a positive (non-negated) condition
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            flags: ConditionFlags::empty(),
        }
    }

    /// Creates a negated condition
    pub fn negated(condition: Condition) -> Self {
        Self {
            condition,
            flags: ConditionFlags::NEGATIVE,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.flags.contains(ConditionFlags::NEGATIVE)
    }
}

impl From<Condition> for PolicyCondition {
    fn from(condition: Condition) -> Self {
        Self::new(condition)
    }
}

impl fmt::Display for PolicyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            write!(f, "!{}", self.condition)
        } else {
            write!(f, "{}", self.condition)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_prefix_contains_v4() {
        let prefix = AddressPrefix::new(addr("10.1.0.0:0"), 16);
        assert!(prefix.contains(&addr("10.1.200.3:443")));
        assert!(!prefix.contains(&addr("10.2.0.1:443")));
    }

    #[test]
    fn test_prefix_partial_byte() {
        let prefix = AddressPrefix::new(addr("192.168.0.128:0"), 25);
        assert!(prefix.contains(&addr("192.168.0.200:1")));
        assert!(!prefix.contains(&addr("192.168.0.100:1")));
    }

    #[test]
    fn test_prefix_port_must_match_when_set() {
        let prefix = AddressPrefix::new(addr("10.0.0.0:53"), 8);
        assert!(prefix.contains(&addr("10.9.9.9:53")));
        assert!(!prefix.contains(&addr("10.9.9.9:54")));
    }

    #[test]
    fn test_prefix_family_mismatch() {
        let prefix = AddressPrefix::new(addr("0.0.0.0:0"), 0);
        assert!(prefix.contains(&addr("1.2.3.4:5")));
        assert!(!prefix.contains(&addr("[::1]:5")));
    }

    #[test]
    fn test_range_contains_v6() {
        let range = AddressRange::new(addr("[fe80::1]:0"), addr("[fe80::ff]:0"));
        assert!(range.contains(&addr("[fe80::10]:80")));
        assert!(!range.contains(&addr("[fe80::100]:80")));
        assert!(!range.contains(&addr("10.0.0.1:80")));
    }

    #[test]
    fn test_condition_codes() {
        assert_eq!(Condition::Default.code(), 0);
        assert_eq!(Condition::Domain("apple.com".to_string()).code(), 3);
        assert_eq!(
            Condition::RemoteAddrRange(AddressRange::new(addr("1.1.1.1:0"), addr("1.1.1.2:0")))
                .code(),
            15
        );
    }

    #[test]
    fn test_negated_display() {
        let cond = PolicyCondition::negated(Condition::Uid(501));
        assert!(cond.is_negative());
        assert_eq!(cond.to_string(), "!Uid (501)");
    }
}
