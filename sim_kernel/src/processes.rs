//! Simulated process table

use core_types::Pid;
use kernel_api::{Credentials, KernelError, ProcessCredentials};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use crate::fault_injection::FaultInjector;

/// Credentials of the processes the simulation knows about
#[derive(Debug, Default)]
pub struct SimProcesses {
    processes: RwLock<HashMap<Pid, Credentials>>,
    faults: Arc<Mutex<FaultInjector>>,
}

impl SimProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_faults(faults: Arc<Mutex<FaultInjector>>) -> Self {
        Self {
            processes: RwLock::new(HashMap::new()),
            faults,
        }
    }

    /// Registers or replaces a process
    pub fn spawn(&self, credentials: Credentials) {
        self.processes.write().insert(credentials.pid, credentials);
    }

    /// Forgets a process; returns its credentials if it existed
    pub fn exit(&self, pid: Pid) -> Option<Credentials> {
        self.processes.write().remove(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.read().is_empty()
    }
}

impl ProcessCredentials for SimProcesses {
    fn credentials(&self, pid: Pid) -> Result<Credentials, KernelError> {
        if self.faults.lock().hides_process(pid) {
            return Err(KernelError::ProcessNotFound(pid));
        }
        self.processes
            .read()
            .get(&pid)
            .cloned()
            .ok_or(KernelError::ProcessNotFound(pid))
    }
}
