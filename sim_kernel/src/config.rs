//! Declarative description of a simulated kernel

use kernel_api::{Credentials, InterfaceDetails, NetAgentInfo};
use serde::{Deserialize, Serialize};

use crate::SimulatedKernel;

/// Processes, interfaces and agents to start with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub processes: Vec<Credentials>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceDetails>,
    #[serde(default)]
    pub agents: Vec<NetAgentInfo>,
}

impl SimConfig {
    pub(crate) fn populate(&self, kernel: &SimulatedKernel) {
        for credentials in &self.processes {
            kernel.processes.spawn(credentials.clone());
        }
        for agent in &self.agents {
            kernel.agents.add(agent.clone());
        }
        for interface in &self.interfaces {
            kernel.interfaces.add(interface.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_api::{InterfaceTable, NetworkAgents, ProcessCredentials};

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "processes": [
                { "pid": 100, "uid": 0, "application": "6f1c3b8e-0000-4000-8000-000000000001" }
            ],
            "interfaces": [
                { "name": "en0", "index": 4, "generation": 1, "functional_type": "wifi_infra", "has_ipv4": true }
            ],
            "agents": [
                { "uuid": "6f1c3b8e-0000-4000-8000-0000000000aa", "domain": "com.example", "agent_type": "VPN" }
            ]
        }"#;
        let config: SimConfig = serde_json::from_str(json).unwrap();
        let kernel = SimulatedKernel::from_config(&config);

        assert!(kernel.processes.credentials(100).unwrap().is_root());
        let en0 = kernel.interfaces.by_name("en0").unwrap();
        assert_eq!(en0.mtu, 1500);
        assert!(en0.functional_type.is_wifi());
        let agent = config.agents[0].uuid;
        assert!(kernel.agents.agent(agent).is_some());
    }

    #[test]
    fn test_empty_config() {
        let config: SimConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SimConfig::default());
    }
}
