//! The aggregate result of evaluating one client against the applied policies

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::PolicyId;
use crate::result::ResultKind;

/// Maximum number of network agents recorded in one aggregate result
pub const MAX_NETAGENTS: usize = 8;

/// Set in `service_flags` when the triggered service is registered by a session
pub const SERVICE_FLAGS_REGISTERED: u32 = 0x01;

bitflags! {
    /// Properties of the routed path reported to the client
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ClientResultFlags: u32 {
        const IS_LOCAL = 0x0001;
        const IS_DIRECT = 0x0002;
        const HAS_IPV4 = 0x0004;
        const HAS_IPV6 = 0x0008;
    }
}

/// Parameter of the routing result, keyed by its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingParameter {
    #[default]
    None,
    /// Divert control unit
    ControlUnit(u32),
    /// Interface a tunnel or scoped result routes to (0 if unknown)
    InterfaceIndex(u32),
}

impl RoutingParameter {
    /// Value carried in the POLICY_RESULT_PARAMETER field
    pub fn raw(&self) -> u32 {
        match self {
            RoutingParameter::None => 0,
            RoutingParameter::ControlUnit(unit) => *unit,
            RoutingParameter::InterfaceIndex(index) => *index,
        }
    }
}

/// A network agent the client should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetAgentUse {
    pub uuid: Uuid,
    /// Agent generation at evaluation time
    pub generation: u32,
    /// Agent flags as reported by the network-agent subsystem
    pub flags: u32,
}

/// Per-client outcome of evaluation
///
/// Produced fresh by every evaluation and handed out by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub routing_result: ResultKind,
    pub routing_parameter: RoutingParameter,
    /// Socket filter control unit, 0 if none
    pub filter_control_unit: u32,
    /// Trigger-family kind that matched, if any
    pub service_action: Option<ResultKind>,
    pub service_uuid: Option<Uuid>,
    pub service_flags: u32,
    pub service_data: u32,
    /// Routed interface index, 0 if none
    pub routed_interface_index: u32,
    /// Policy that decided the routing result; None for the implicit pass
    pub policy_id: Option<PolicyId>,
    pub netagents: Vec<NetAgentUse>,
    pub flags: ClientResultFlags,
    pub qos_marking: bool,
}

impl AggregateResult {
    /// The implicit result when no terminal policy matches
    pub fn pass() -> Self {
        Self {
            routing_result: ResultKind::Pass,
            routing_parameter: RoutingParameter::None,
            filter_control_unit: 0,
            service_action: None,
            service_uuid: None,
            service_flags: 0,
            service_data: 0,
            routed_interface_index: 0,
            policy_id: None,
            netagents: Vec::new(),
            flags: ClientResultFlags::empty(),
            qos_marking: false,
        }
    }

    /// Records a network agent. Duplicates and agents past the cap are ignored.
    ///
    /// Returns true if the agent was added.
    pub fn push_netagent(&mut self, agent: NetAgentUse) -> bool {
        if self.netagents.len() >= MAX_NETAGENTS
            || self.netagents.iter().any(|a| a.uuid == agent.uuid)
        {
            return false;
        }
        self.netagents.push(agent);
        true
    }

    pub fn is_drop(&self) -> bool {
        self.routing_result == ResultKind::Drop
    }
}

impl Default for AggregateResult {
    fn default() -> Self {
        Self::pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(uuid: Uuid) -> NetAgentUse {
        NetAgentUse {
            uuid,
            generation: 1,
            flags: 0,
        }
    }

    #[test]
    fn test_default_is_implicit_pass() {
        let result = AggregateResult::default();
        assert_eq!(result.routing_result, ResultKind::Pass);
        assert!(result.policy_id.is_none());
        assert_eq!(result.routing_parameter.raw(), 0);
    }

    #[test]
    fn test_netagents_deduplicated() {
        let mut result = AggregateResult::pass();
        let uuid = Uuid::new_v4();
        assert!(result.push_netagent(agent(uuid)));
        assert!(!result.push_netagent(agent(uuid)));
        assert_eq!(result.netagents.len(), 1);
    }

    #[test]
    fn test_netagents_capped() {
        let mut result = AggregateResult::pass();
        for _ in 0..MAX_NETAGENTS {
            assert!(result.push_netagent(agent(Uuid::new_v4())));
        }
        assert!(!result.push_netagent(agent(Uuid::new_v4())));
        assert_eq!(result.netagents.len(), MAX_NETAGENTS);
    }
}
