//! Resilience Test Utilities
//!
//! This crate provides shared setup for resilience and integration tests.
//!
//! ## Test Philosophy
//!
//! - **Safety under faults**: The control plane keeps its invariants when collaborators fail
//! - **Deterministic failures**: All collaborator faults are reproducible via FaultPlan
//! - **Atomic commits**: Evaluators never observe a half-applied policy set
//! - **Clean teardown**: Closing a session or exiting a process leaves nothing behind

use core_types::{FunctionalType, Pid};
use kernel_api::{Credentials, InterfaceDetails};
use services_policy_session::{NecpConfig, NecpHost};
use sim_kernel::fault_injection::FaultPlan;
use sim_kernel::SimulatedKernel;
use uuid::Uuid;

/// Root daemon allowed to open control sessions
pub const DAEMON_PID: Pid = 1;

/// Second root daemon, for multi-session scenarios
pub const VPN_DAEMON_PID: Pid = 2;

/// Unprivileged application
pub const APP_PID: Pid = 300;

/// Bootstrap helper for tests
///
/// Creates a kernel with two root daemons, one application and a wired and a
/// cellular interface, plus a host on top of it.
pub fn test_bootstrap() -> (SimulatedKernel, NecpHost) {
    bootstrap_with_faults(FaultPlan::new())
}

/// Same as [`test_bootstrap`], with collaborator faults injected
pub fn bootstrap_with_faults(plan: FaultPlan) -> (SimulatedKernel, NecpHost) {
    let kernel = SimulatedKernel::with_fault_plan(plan);
    for (pid, uid) in [(DAEMON_PID, 0), (VPN_DAEMON_PID, 0), (APP_PID, 501)] {
        kernel
            .processes
            .spawn(Credentials::new(pid, uid, Uuid::new_v4()));
    }
    kernel
        .interfaces
        .add(InterfaceDetails::new("en0", 4, FunctionalType::Wired));
    kernel
        .interfaces
        .add(InterfaceDetails::new("pdp_ip0", 7, FunctionalType::Cellular));
    let host = NecpHost::new(kernel.collaborators(), NecpConfig::default());
    (kernel, host)
}
