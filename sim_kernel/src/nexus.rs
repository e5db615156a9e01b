//! Simulated nexus provider
//!
//! A request is accepted when the agent exists and advertises itself as a nexus
//! provider. The answer is produced later by [`SimNexus::assign_next`], mirroring
//! the asynchronous provider on a real system.

use kernel_api::{
    KernelError, NetAgentFlags, NetworkAgents, NexusInstance, NexusProvider, NexusRequest,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::agents::SimAgents;
use crate::fault_injection::FaultInjector;
use crate::request_audit::{RequestAuditLog, RequestEvent};

/// First port handed out by the provider
pub const FIRST_NEXUS_PORT: u16 = 2;

#[derive(Debug)]
pub struct SimNexus {
    agents: Arc<SimAgents>,
    pending: Mutex<VecDeque<NexusRequest>>,
    next_port: Mutex<u16>,
    audit: Mutex<RequestAuditLog>,
    faults: Arc<Mutex<FaultInjector>>,
}

impl SimNexus {
    pub fn new(agents: Arc<SimAgents>) -> Self {
        Self::with_faults(agents, Arc::default())
    }

    pub(crate) fn with_faults(agents: Arc<SimAgents>, faults: Arc<Mutex<FaultInjector>>) -> Self {
        Self {
            agents,
            pending: Mutex::new(VecDeque::new()),
            next_port: Mutex::new(FIRST_NEXUS_PORT),
            audit: Mutex::new(RequestAuditLog::new()),
            faults,
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Answers the oldest pending request with a fresh instance
    pub fn assign_next(&self) -> Option<(NexusRequest, NexusInstance)> {
        let request = self.pending.lock().pop_front()?;
        let port = {
            let mut next = self.next_port.lock();
            let port = *next;
            *next = next.wrapping_add(1).max(FIRST_NEXUS_PORT);
            port
        };
        let instance = NexusInstance {
            instance: Uuid::new_v4(),
            port,
        };
        debug!(client = %request.client, port, "nexus instance assigned");
        Some((request, instance))
    }

    pub fn audit(&self) -> RequestAuditLog {
        self.audit.lock().clone()
    }
}

impl NexusProvider for SimNexus {
    fn request_instance(&self, request: NexusRequest) -> Result<(), KernelError> {
        let provides = self
            .agents
            .agent(request.agent)
            .is_some_and(|info| info.flags.contains(NetAgentFlags::NEXUS_PROVIDER));
        let outcome = if !provides {
            Err(KernelError::NoNexusProvider(request.agent))
        } else if self.faults.lock().should_reject_nexus_request() {
            Err(KernelError::RequestRejected("nexus provider busy".to_string()))
        } else {
            Ok(())
        };
        self.audit
            .lock()
            .record(RequestEvent::Nexus(request), outcome.is_ok());
        if outcome.is_ok() {
            self.pending.lock().push_back(request);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ClientId;
    use kernel_api::NetAgentInfo;

    #[test]
    fn test_request_then_assign() {
        let agents = Arc::new(SimAgents::new());
        let agent = Uuid::new_v4();
        agents.add(
            NetAgentInfo::new(agent, "com.example", "Flow")
                .with_flags(NetAgentFlags::ACTIVE | NetAgentFlags::NEXUS_PROVIDER),
        );
        let nexus = SimNexus::new(Arc::clone(&agents));
        let request = NexusRequest {
            client: ClientId::new(),
            pid: 1,
            agent,
        };
        nexus.request_instance(request).unwrap();
        assert_eq!(nexus.pending_requests(), 1);

        let (answered, instance) = nexus.assign_next().unwrap();
        assert_eq!(answered, request);
        assert_eq!(instance.port, FIRST_NEXUS_PORT);
        assert!(nexus.assign_next().is_none());
    }

    #[test]
    fn test_agent_without_provider_flag() {
        let agents = Arc::new(SimAgents::new());
        let agent = Uuid::new_v4();
        agents.add(NetAgentInfo::new(agent, "com.example", "VPN"));
        let nexus = SimNexus::new(agents);
        let request = NexusRequest {
            client: ClientId::new(),
            pid: 1,
            agent,
        };
        assert_eq!(
            nexus.request_instance(request),
            Err(KernelError::NoNexusProvider(agent))
        );
        assert_eq!(nexus.audit().events().len(), 1);
    }
}
