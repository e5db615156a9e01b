//! The shared NECP context

use kernel_api::Collaborators;
use policy::PolicyStore;
use serde::{Deserialize, Serialize};
use services_client_registry::{ClientRegistry, RegistryLimits};
use std::sync::Arc;

/// Tunables for a context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NecpConfig {
    pub limits: RegistryLimits,
}

/// Store, registry and collaborators, shared by every session and channel
#[derive(Debug)]
pub struct NecpContext {
    store: Arc<PolicyStore>,
    registry: ClientRegistry,
    collaborators: Collaborators,
    config: NecpConfig,
}

impl NecpContext {
    pub fn new(collaborators: Collaborators, config: NecpConfig) -> Self {
        let store = Arc::new(PolicyStore::new());
        let registry =
            ClientRegistry::with_limits(Arc::clone(&store), collaborators.clone(), config.limits);
        Self {
            store,
            registry,
            collaborators,
            config,
        }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn config(&self) -> NecpConfig {
        self.config
    }
}
