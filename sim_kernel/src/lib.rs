//! # Simulated Kernel
//!
//! This crate provides in-process implementations of the NECP collaborator
//! traits defined in `kernel_api`.
//!
//! ## Purpose
//!
//! The simulated kernel allows testing the control plane without a kernel:
//! - Runs under `cargo test`
//! - Deterministic (requests are queued and answered when the test says so)
//! - Inspectable (pending requests and an audit log are directly accessible)
//!
//! ## Philosophy
//!
//! **Testability is a first-class design constraint.**
//!
//! This is not a mock. Each collaborator keeps real state, enforces the same
//! rules a kernel would (unknown agents are rejected, only nexus providers get
//! nexus requests) and can be driven into failure with a
//! [`fault_injection::FaultPlan`].

pub mod agents;
pub mod config;
pub mod fault_injection;
pub mod interfaces;
pub mod nexus;
pub mod processes;
pub mod request_audit;

pub use agents::SimAgents;
pub use config::SimConfig;
pub use interfaces::SimInterfaces;
pub use nexus::SimNexus;
pub use processes::SimProcesses;

use fault_injection::{FaultInjector, FaultPlan};
use kernel_api::Collaborators;
use parking_lot::Mutex;
use std::sync::Arc;

/// The four simulated collaborators, sharing one fault injector
#[derive(Debug, Clone)]
pub struct SimulatedKernel {
    pub processes: Arc<SimProcesses>,
    pub interfaces: Arc<SimInterfaces>,
    pub agents: Arc<SimAgents>,
    pub nexus: Arc<SimNexus>,
}

impl SimulatedKernel {
    /// Creates an empty simulated kernel
    pub fn new() -> Self {
        Self::with_fault_plan(FaultPlan::new())
    }

    /// Creates an empty simulated kernel that injects the planned faults
    pub fn with_fault_plan(plan: FaultPlan) -> Self {
        let faults = Arc::new(Mutex::new(FaultInjector::new(plan)));
        let agents = Arc::new(SimAgents::with_faults(Arc::clone(&faults)));
        Self {
            processes: Arc::new(SimProcesses::with_faults(Arc::clone(&faults))),
            interfaces: Arc::new(SimInterfaces::new()),
            nexus: Arc::new(SimNexus::with_faults(Arc::clone(&agents), faults)),
            agents,
        }
    }

    /// Creates a simulated kernel populated from configuration
    pub fn from_config(config: &SimConfig) -> Self {
        let kernel = Self::new();
        config.populate(&kernel);
        kernel
    }

    /// Trait-object handles for the control plane
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.processes.clone(),
            self.interfaces.clone(),
            self.agents.clone(),
            self.nexus.clone(),
        )
    }
}

impl Default for SimulatedKernel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::FunctionalType;
    use fault_injection::CollaboratorFault;
    use kernel_api::{
        Credentials, InterfaceDetails, InterfaceTable, KernelError, ProcessCredentials,
    };
    use uuid::Uuid;

    #[test]
    fn test_collaborators_share_state() {
        let kernel = SimulatedKernel::new();
        let collaborators = kernel.collaborators();
        kernel
            .interfaces
            .add(InterfaceDetails::new("en0", 4, FunctionalType::Wired));
        assert!(collaborators.interfaces.by_name("en0").is_some());

        kernel.processes.spawn(Credentials::new(5, 501, Uuid::new_v4()));
        assert_eq!(collaborators.credentials.credentials(5).unwrap().uid, 501);
    }

    #[test]
    fn test_fault_plan_reaches_processes() {
        let kernel = SimulatedKernel::with_fault_plan(
            FaultPlan::new().with_fault(CollaboratorFault::UnknownProcess { pid: 5 }),
        );
        kernel.processes.spawn(Credentials::new(5, 501, Uuid::new_v4()));
        assert_eq!(
            kernel.collaborators().credentials.credentials(5),
            Err(KernelError::ProcessNotFound(5))
        );
    }
}
