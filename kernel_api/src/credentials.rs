//! Process credentials

use crate::KernelError;
use core_types::{Pid, Uid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Entitlement a process needs to present another process's identity
pub const MATCH_ENTITLEMENT: &str = "com.apple.private.necp.match";

/// Identity of a process as seen by NECP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub pid: Pid,
    pub uid: Uid,
    /// Executable uuid of the process
    pub application: Uuid,
    #[serde(default)]
    pub entitlements: BTreeSet<String>,
}

impl Credentials {
    pub fn new(pid: Pid, uid: Uid, application: Uuid) -> Self {
        Self {
            pid,
            uid,
            application,
            entitlements: BTreeSet::new(),
        }
    }

    pub fn with_entitlement(mut self, entitlement: impl Into<String>) -> Self {
        self.entitlements.insert(entitlement.into());
        self
    }

    pub fn has_entitlement(&self, entitlement: &str) -> bool {
        self.entitlements.contains(entitlement)
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

/// Source of process identity
pub trait ProcessCredentials: Send + Sync {
    /// Looks up the credentials of a live process
    fn credentials(&self, pid: Pid) -> Result<Credentials, KernelError>;
}
