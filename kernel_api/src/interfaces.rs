//! Interface table

use bitflags::bitflags;
use core_types::FunctionalType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct InterfaceFlags: u32 {
        const EXPENSIVE = 0x0001;
    }
}

/// Details of one network interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDetails {
    pub name: String,
    pub index: u32,
    pub generation: u32,
    #[serde(default)]
    pub functional_type: FunctionalType,
    /// Index of the interface this one delegates to, 0 if none
    #[serde(default)]
    pub delegate_index: u32,
    #[serde(default)]
    pub flags: InterfaceFlags,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default)]
    pub has_ipv4: bool,
    #[serde(default)]
    pub has_ipv6: bool,
    /// Network agents attached to this interface
    #[serde(default)]
    pub agents: Vec<Uuid>,
}

fn default_mtu() -> u32 {
    1500
}

impl InterfaceDetails {
    pub fn new(name: impl Into<String>, index: u32, functional_type: FunctionalType) -> Self {
        Self {
            name: name.into(),
            index,
            generation: 1,
            functional_type,
            delegate_index: 0,
            flags: InterfaceFlags::empty(),
            mtu: default_mtu(),
            has_ipv4: true,
            has_ipv6: false,
            agents: Vec::new(),
        }
    }

    pub fn with_flags(mut self, flags: InterfaceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_ipv6(mut self, has_ipv6: bool) -> Self {
        self.has_ipv6 = has_ipv6;
        self
    }

    pub fn with_agent(mut self, agent: Uuid) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn is_expensive(&self) -> bool {
        self.flags.contains(InterfaceFlags::EXPENSIVE)
    }
}

/// Read access to the interface table
pub trait InterfaceTable: Send + Sync {
    /// All interfaces, in routing preference order
    fn interfaces(&self) -> Vec<InterfaceDetails>;

    fn by_index(&self, index: u32) -> Option<InterfaceDetails>;

    fn by_name(&self, name: &str) -> Option<InterfaceDetails>;

    /// Counter bumped on every interface change
    fn generation(&self) -> u64;
}
