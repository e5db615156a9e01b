//! Simulated network-agent subsystem
//!
//! Requests are queued, never acted on inline. Tests drain the queue to see what
//! the registry asked for.

use kernel_api::{AgentRequest, KernelError, NetAgentInfo, NetworkAgents};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::fault_injection::FaultInjector;
use crate::request_audit::{RequestAuditLog, RequestEvent};

#[derive(Debug, Default)]
pub struct SimAgents {
    agents: RwLock<HashMap<Uuid, NetAgentInfo>>,
    pending: Mutex<VecDeque<AgentRequest>>,
    audit: Mutex<RequestAuditLog>,
    faults: Arc<Mutex<FaultInjector>>,
}

impl SimAgents {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_faults(faults: Arc<Mutex<FaultInjector>>) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    /// Registers or replaces an agent
    pub fn add(&self, info: NetAgentInfo) {
        self.agents.write().insert(info.uuid, info);
    }

    pub fn remove(&self, uuid: Uuid) -> Option<NetAgentInfo> {
        self.agents.write().remove(&uuid)
    }

    /// Bumps an agent's generation, as an agent update would
    pub fn update(&self, uuid: Uuid) -> Option<u32> {
        self.agents.write().get_mut(&uuid).map(|info| {
            info.generation += 1;
            info.generation
        })
    }

    /// Takes every request received so far, oldest first
    pub fn drain_requests(&self) -> Vec<AgentRequest> {
        self.pending.lock().drain(..).collect()
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn audit(&self) -> RequestAuditLog {
        self.audit.lock().clone()
    }
}

impl NetworkAgents for SimAgents {
    fn agent(&self, uuid: Uuid) -> Option<NetAgentInfo> {
        self.agents.read().get(&uuid).cloned()
    }

    fn request(&self, request: AgentRequest) -> Result<(), KernelError> {
        let outcome = if !self.agents.read().contains_key(&request.agent) {
            Err(KernelError::AgentNotFound(request.agent))
        } else if self.faults.lock().should_reject_agent_request() {
            Err(KernelError::RequestRejected(format!(
                "agent {} unavailable",
                request.agent
            )))
        } else {
            Ok(())
        };
        self.audit
            .lock()
            .record(RequestEvent::Agent(request), outcome.is_ok());
        if outcome.is_ok() {
            debug!(agent = %request.agent, action = ?request.action, "agent request queued");
            self.pending.lock().push_back(request);
        }
        outcome
    }
}
