//! Flow client parameters
//!
//! A flow client describes itself with an ordered list of parameters. Most of them
//! mirror policy conditions; the rest steer interface and agent selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// Interface functional type, as reported by the interface table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FunctionalType {
    #[default]
    Unknown = 0,
    Loopback = 1,
    Wired = 2,
    WifiInfra = 3,
    WifiAwdl = 4,
    Cellular = 5,
}

impl FunctionalType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FunctionalType::Unknown),
            1 => Some(FunctionalType::Loopback),
            2 => Some(FunctionalType::Wired),
            3 => Some(FunctionalType::WifiInfra),
            4 => Some(FunctionalType::WifiAwdl),
            5 => Some(FunctionalType::Cellular),
            _ => None,
        }
    }

    pub fn is_wifi(self) -> bool {
        matches!(self, FunctionalType::WifiInfra | FunctionalType::WifiAwdl)
    }
}

/// Network agent type selector: a domain and a type name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentType {
    pub domain: String,
    pub agent_type: String,
}

impl AgentType {
    /// Width of each name field on the wire
    pub const FIELD_LEN: usize = 32;

    pub fn new(domain: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            agent_type: agent_type.into(),
        }
    }

    /// An empty field acts as a wildcard
    pub fn matches(&self, domain: &str, agent_type: &str) -> bool {
        (self.domain.is_empty() || self.domain == domain)
            && (self.agent_type.is_empty() || self.agent_type == agent_type)
    }
}

/// Local or remote endpoint of a flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Address(SocketAddr),
    /// A host name to be resolved, with a client-specific type tag
    Name {
        name: String,
        port: u16,
        endpoint_type: u32,
    },
}

impl Endpoint {
    pub fn address(&self) -> Option<SocketAddr> {
        match self {
            Endpoint::Address(addr) => Some(*addr),
            Endpoint::Name { .. } => None,
        }
    }

    pub fn host_name(&self) -> Option<&str> {
        match self {
            Endpoint::Name { name, .. } => Some(name),
            Endpoint::Address(_) => None,
        }
    }
}

/// A single attribute presented by a flow client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ClientParameter {
    Application(Uuid),
    RealApplication(Uuid),
    Domain(String),
    Account(String),
    Pid(i32),
    Uid(u32),
    BoundInterface(String),
    TrafficClass(u32),
    IpProtocol(u8),
    LocalAddress(SocketAddr),
    RemoteAddress(SocketAddr),
    ProhibitInterface(String),
    ProhibitInterfaceType(FunctionalType),
    ProhibitAgent(Uuid),
    ProhibitAgentType(AgentType),
    RequireInterfaceType(FunctionalType),
    RequireAgent(Uuid),
    RequireAgentType(AgentType),
    PreferAgent(Uuid),
    PreferAgentType(AgentType),
    TriggerAgent(Uuid),
    AssertAgent(Uuid),
    UnassertAgent(Uuid),
    LocalEndpoint(Endpoint),
    RemoteEndpoint(Endpoint),
}

impl ClientParameter {
    pub const CODE_APPLICATION: u8 = 1;
    pub const CODE_REAL_APPLICATION: u8 = 2;
    pub const CODE_DOMAIN: u8 = 3;
    pub const CODE_ACCOUNT: u8 = 4;
    pub const CODE_PID: u8 = 6;
    pub const CODE_UID: u8 = 7;
    pub const CODE_BOUND_INTERFACE: u8 = 9;
    pub const CODE_TRAFFIC_CLASS: u8 = 10;
    pub const CODE_IP_PROTOCOL: u8 = 11;
    pub const CODE_LOCAL_ADDRESS: u8 = 12;
    pub const CODE_REMOTE_ADDRESS: u8 = 13;
    pub const CODE_PROHIBIT_INTERFACE: u8 = 100;
    pub const CODE_PROHIBIT_IF_TYPE: u8 = 101;
    pub const CODE_PROHIBIT_AGENT: u8 = 102;
    pub const CODE_PROHIBIT_AGENT_TYPE: u8 = 103;
    pub const CODE_REQUIRE_IF_TYPE: u8 = 111;
    pub const CODE_REQUIRE_AGENT: u8 = 112;
    pub const CODE_REQUIRE_AGENT_TYPE: u8 = 113;
    pub const CODE_PREFER_AGENT: u8 = 122;
    pub const CODE_PREFER_AGENT_TYPE: u8 = 123;
    pub const CODE_TRIGGER_AGENT: u8 = 130;
    pub const CODE_ASSERT_AGENT: u8 = 131;
    pub const CODE_UNASSERT_AGENT: u8 = 132;
    pub const CODE_LOCAL_ENDPOINT: u8 = 200;
    pub const CODE_REMOTE_ENDPOINT: u8 = 201;

    pub fn code(&self) -> u8 {
        match self {
            ClientParameter::Application(_) => Self::CODE_APPLICATION,
            ClientParameter::RealApplication(_) => Self::CODE_REAL_APPLICATION,
            ClientParameter::Domain(_) => Self::CODE_DOMAIN,
            ClientParameter::Account(_) => Self::CODE_ACCOUNT,
            ClientParameter::Pid(_) => Self::CODE_PID,
            ClientParameter::Uid(_) => Self::CODE_UID,
            ClientParameter::BoundInterface(_) => Self::CODE_BOUND_INTERFACE,
            ClientParameter::TrafficClass(_) => Self::CODE_TRAFFIC_CLASS,
            ClientParameter::IpProtocol(_) => Self::CODE_IP_PROTOCOL,
            ClientParameter::LocalAddress(_) => Self::CODE_LOCAL_ADDRESS,
            ClientParameter::RemoteAddress(_) => Self::CODE_REMOTE_ADDRESS,
            ClientParameter::ProhibitInterface(_) => Self::CODE_PROHIBIT_INTERFACE,
            ClientParameter::ProhibitInterfaceType(_) => Self::CODE_PROHIBIT_IF_TYPE,
            ClientParameter::ProhibitAgent(_) => Self::CODE_PROHIBIT_AGENT,
            ClientParameter::ProhibitAgentType(_) => Self::CODE_PROHIBIT_AGENT_TYPE,
            ClientParameter::RequireInterfaceType(_) => Self::CODE_REQUIRE_IF_TYPE,
            ClientParameter::RequireAgent(_) => Self::CODE_REQUIRE_AGENT,
            ClientParameter::RequireAgentType(_) => Self::CODE_REQUIRE_AGENT_TYPE,
            ClientParameter::PreferAgent(_) => Self::CODE_PREFER_AGENT,
            ClientParameter::PreferAgentType(_) => Self::CODE_PREFER_AGENT_TYPE,
            ClientParameter::TriggerAgent(_) => Self::CODE_TRIGGER_AGENT,
            ClientParameter::AssertAgent(_) => Self::CODE_ASSERT_AGENT,
            ClientParameter::UnassertAgent(_) => Self::CODE_UNASSERT_AGENT,
            ClientParameter::LocalEndpoint(_) => Self::CODE_LOCAL_ENDPOINT,
            ClientParameter::RemoteEndpoint(_) => Self::CODE_REMOTE_ENDPOINT,
        }
    }

    /// Parameters that claim another process's identity need an entitlement
    pub fn requires_entitlement(&self) -> bool {
        matches!(
            self,
            ClientParameter::Application(_)
                | ClientParameter::RealApplication(_)
                | ClientParameter::Pid(_)
                | ClientParameter::Uid(_)
        )
    }

    /// Agent actions are only meaningful as input to an agent request
    pub fn is_agent_action(&self) -> bool {
        matches!(
            self,
            ClientParameter::TriggerAgent(_)
                | ClientParameter::AssertAgent(_)
                | ClientParameter::UnassertAgent(_)
        )
    }
}

impl fmt::Display for ClientParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientParameter::Application(uuid) => write!(f, "application={}", uuid),
            ClientParameter::RealApplication(uuid) => write!(f, "real_application={}", uuid),
            ClientParameter::Domain(domain) => write!(f, "domain={}", domain),
            ClientParameter::Account(account) => write!(f, "account={}", account),
            ClientParameter::Pid(pid) => write!(f, "pid={}", pid),
            ClientParameter::Uid(uid) => write!(f, "uid={}", uid),
            ClientParameter::BoundInterface(name) => write!(f, "bound_interface={}", name),
            ClientParameter::TrafficClass(tc) => write!(f, "traffic_class={}", tc),
            ClientParameter::IpProtocol(proto) => write!(f, "ip_protocol={}", proto),
            ClientParameter::LocalAddress(addr) => write!(f, "local_address={}", addr),
            ClientParameter::RemoteAddress(addr) => write!(f, "remote_address={}", addr),
            other => write!(f, "parameter({})", other.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entitlement_required() {
        assert!(ClientParameter::Pid(1).requires_entitlement());
        assert!(ClientParameter::Application(Uuid::new_v4()).requires_entitlement());
        assert!(!ClientParameter::Domain("apple.com".into()).requires_entitlement());
    }

    #[test]
    fn test_agent_type_wildcards() {
        let any_vpn = AgentType::new("", "VPN");
        assert!(any_vpn.matches("com.example", "VPN"));
        assert!(!any_vpn.matches("com.example", "DNS"));
        assert!(AgentType::new("", "").matches("a", "b"));
    }

    #[test]
    fn test_functional_type_codes() {
        assert_eq!(FunctionalType::from_code(5), Some(FunctionalType::Cellular));
        assert_eq!(FunctionalType::from_code(6), None);
        assert!(FunctionalType::WifiAwdl.is_wifi());
        assert!(!FunctionalType::Wired.is_wifi());
    }

    #[test]
    fn test_endpoint_accessors() {
        let named = Endpoint::Name {
            name: "www.apple.com".into(),
            port: 443,
            endpoint_type: 0,
        };
        assert_eq!(named.host_name(), Some("www.apple.com"));
        assert!(named.address().is_none());
    }

    #[test]
    fn test_parameter_codes() {
        assert_eq!(ClientParameter::Uid(0).code(), 7);
        assert_eq!(ClientParameter::RequireAgent(Uuid::nil()).code(), 112);
        assert!(ClientParameter::UnassertAgent(Uuid::nil()).is_agent_action());
    }
}
