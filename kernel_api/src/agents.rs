//! Network agents

use crate::KernelError;
use bitflags::bitflags;
use core_types::{ClientId, Pid};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct NetAgentFlags: u32 {
        const ACTIVE = 0x0001;
        const KERNEL_ACTIVATED = 0x0002;
        const USER_ACTIVATED = 0x0004;
        const VOLUNTARY = 0x0008;
        /// Provides a nexus instance on request
        const NEXUS_PROVIDER = 0x0020;
    }
}

/// Registered network agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetAgentInfo {
    pub uuid: Uuid,
    pub domain: String,
    pub agent_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub flags: NetAgentFlags,
}

impl NetAgentInfo {
    pub fn new(uuid: Uuid, domain: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            uuid,
            domain: domain.into(),
            agent_type: agent_type.into(),
            description: String::new(),
            generation: 1,
            flags: NetAgentFlags::ACTIVE,
        }
    }

    pub fn with_flags(mut self, flags: NetAgentFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_active(&self) -> bool {
        self.flags.contains(NetAgentFlags::ACTIVE)
    }
}

/// What a client asks of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentAction {
    Trigger,
    Assert,
    Unassert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub client: ClientId,
    pub pid: Pid,
    pub agent: Uuid,
    pub action: AgentAction,
}

/// The network-agent subsystem
pub trait NetworkAgents: Send + Sync {
    fn agent(&self, uuid: Uuid) -> Option<NetAgentInfo>;

    /// Delivers a client request; the agent answers out of band
    fn request(&self, request: AgentRequest) -> Result<(), KernelError>;
}
