//! Deterministic fault injection for collaborator calls
//!
//! Tests describe which collaborator requests should fail with a [`FaultPlan`];
//! the simulated collaborators consult a shared [`FaultInjector`] before doing
//! any work.
//!
//! ## Example
//!
//! ```
//! use sim_kernel::fault_injection::{CollaboratorFault, FaultPlan};
//!
//! let plan = FaultPlan::new()
//!     .with_fault(CollaboratorFault::RejectAgentRequests { count: 2 })
//!     .with_fault(CollaboratorFault::UnknownProcess { pid: 42 });
//! assert_eq!(plan.faults().len(), 2);
//! ```

use core_types::Pid;
use std::collections::BTreeSet;

/// A failure to inject into one collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorFault {
    /// Reject the next N network-agent requests
    RejectAgentRequests { count: usize },

    /// Reject the next N nexus instance requests
    RejectNexusRequests { count: usize },

    /// Credential lookups for this pid fail as if the process had exited
    UnknownProcess { pid: Pid },
}

/// The faults a test wants injected
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Vec<CollaboratorFault>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self { faults: Vec::new() }
    }

    pub fn with_fault(mut self, fault: CollaboratorFault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn faults(&self) -> &[CollaboratorFault] {
        &self.faults
    }
}

/// Running state of a fault plan
#[derive(Debug, Default)]
pub struct FaultInjector {
    reject_agent: usize,
    reject_nexus: usize,
    unknown_pids: BTreeSet<Pid>,
    injected: usize,
}

impl FaultInjector {
    pub fn new(plan: FaultPlan) -> Self {
        let mut injector = Self::default();
        for fault in plan.faults() {
            match fault {
                CollaboratorFault::RejectAgentRequests { count } => injector.reject_agent += count,
                CollaboratorFault::RejectNexusRequests { count } => injector.reject_nexus += count,
                CollaboratorFault::UnknownProcess { pid } => {
                    injector.unknown_pids.insert(*pid);
                }
            }
        }
        injector
    }

    /// Returns true if the current agent request should be rejected
    pub fn should_reject_agent_request(&mut self) -> bool {
        Self::take(&mut self.reject_agent, &mut self.injected)
    }

    /// Returns true if the current nexus request should be rejected
    pub fn should_reject_nexus_request(&mut self) -> bool {
        Self::take(&mut self.reject_nexus, &mut self.injected)
    }

    pub fn hides_process(&self, pid: Pid) -> bool {
        self.unknown_pids.contains(&pid)
    }

    /// Number of request failures injected so far
    pub fn injected(&self) -> usize {
        self.injected
    }

    fn take(remaining: &mut usize, injected: &mut usize) -> bool {
        if *remaining == 0 {
            return false;
        }
        *remaining -= 1;
        *injected += 1;
        true
    }
}
