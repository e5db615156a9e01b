//! Simulated interface table
//!
//! Every mutation bumps the table generation so cached client results can tell
//! the routing environment changed.

use kernel_api::{InterfaceDetails, InterfaceTable};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

/// Interfaces keyed by index
#[derive(Debug, Default)]
pub struct SimInterfaces {
    interfaces: RwLock<BTreeMap<u32, InterfaceDetails>>,
    generation: AtomicU64,
}

impl SimInterfaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an interface
    pub fn add(&self, details: InterfaceDetails) {
        debug!(name = %details.name, index = details.index, "interface attached");
        self.interfaces.write().insert(details.index, details);
        self.bump();
    }

    pub fn remove(&self, index: u32) -> Option<InterfaceDetails> {
        let removed = self.interfaces.write().remove(&index);
        if removed.is_some() {
            debug!(index, "interface detached");
            self.bump();
        }
        removed
    }

    /// Attaches a network agent to an interface; false if the index is unknown
    pub fn attach_agent(&self, index: u32, agent: Uuid) -> bool {
        let attached = match self.interfaces.write().get_mut(&index) {
            Some(details) => {
                if !details.agents.contains(&agent) {
                    details.agents.push(agent);
                    details.generation += 1;
                }
                true
            }
            None => false,
        };
        if attached {
            self.bump();
        }
        attached
    }

    /// Marks the table changed without altering any entry
    pub fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl InterfaceTable for SimInterfaces {
    fn interfaces(&self) -> Vec<InterfaceDetails> {
        self.interfaces.read().values().cloned().collect()
    }

    fn by_index(&self, index: u32) -> Option<InterfaceDetails> {
        self.interfaces.read().get(&index).cloned()
    }

    fn by_name(&self, name: &str) -> Option<InterfaceDetails> {
        self.interfaces
            .read()
            .values()
            .find(|details| details.name == name)
            .cloned()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
