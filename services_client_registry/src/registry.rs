//! The client registry
//!
//! Locking: the channel and client maps are held only long enough to find or
//! insert an entry, and each client entry has its own mutex. Neither is held
//! while credentials are looked up, while a client is evaluated, or while an
//! agent or nexus request is issued.

use bytes::Bytes;
use core_types::{ChannelId, ClientId, ClientParameter, ClientStatistics, Pid};
use kernel_api::{
    AgentAction, AgentRequest, Collaborators, Credentials, NexusInstance, NexusRequest,
    MATCH_ENTITLEMENT,
};
use necp_wire::{
    decode_parameters, decode_statistics, encode_client_list, encode_interface_details,
    encode_netagent, ClientResultView,
};
use parking_lot::{Mutex, RwLock};
use policy::{ClientAttributes, EvaluationEnv, PolicyStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{CachedResult, Channel, ChannelFlags, ClientEntry, ClientState};
use crate::error::ClientError;

/// Largest encoded parameter buffer a client may register
pub const MAX_PARAMETERS_LEN: usize = 1024;

/// Largest encoded result handed back to a client
pub const MAX_RESULT_LEN: usize = 512;

/// Size limits applied to client buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryLimits {
    pub max_parameters_len: usize,
    pub max_result_len: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_parameters_len: MAX_PARAMETERS_LEN,
            max_result_len: MAX_RESULT_LEN,
        }
    }
}

type SharedEntry = Arc<Mutex<ClientEntry>>;

/// Registry of flow clients and the channels that own them
pub struct ClientRegistry {
    store: Arc<PolicyStore>,
    collaborators: Collaborators,
    limits: RegistryLimits,
    channels: RwLock<HashMap<ChannelId, Channel>>,
    clients: RwLock<HashMap<ClientId, SharedEntry>>,
}

impl ClientRegistry {
    pub fn new(store: Arc<PolicyStore>, collaborators: Collaborators) -> Self {
        Self::with_limits(store, collaborators, RegistryLimits::default())
    }

    pub fn with_limits(
        store: Arc<PolicyStore>,
        collaborators: Collaborators,
        limits: RegistryLimits,
    ) -> Self {
        Self {
            store,
            collaborators,
            limits,
            channels: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Opens a channel for `pid`. Observers must run as root.
    pub fn open_channel(&self, pid: Pid, flags: ChannelFlags) -> Result<ChannelId, ClientError> {
        let credentials = self.collaborators.credentials.credentials(pid)?;
        if flags.contains(ChannelFlags::OBSERVER) && !credentials.is_root() {
            warn!(pid, uid = credentials.uid, "observer channel refused");
            return Err(ClientError::PermissionDenied(
                "observer channels require uid 0".to_string(),
            ));
        }
        let id = ChannelId::new();
        self.channels.write().insert(id, Channel { id, pid, flags });
        debug!(channel = %id, pid, ?flags, "channel opened");
        Ok(id)
    }

    /// Closes a channel and removes every client it owns
    pub fn close_channel(&self, channel: ChannelId) -> Result<usize, ClientError> {
        self.channels
            .write()
            .remove(&channel)
            .ok_or(ClientError::ChannelNotFound(channel))?;
        let removed = self.remove_clients_where(|entry| entry.channel == channel);
        debug!(channel = %channel, removed, "channel closed");
        Ok(removed)
    }

    /// Registers a client from its encoded parameters
    pub fn add(&self, channel: ChannelId, parameters: &[u8]) -> Result<ClientId, ClientError> {
        let owner = self.channel(channel)?;
        if parameters.len() > self.limits.max_parameters_len {
            return Err(ClientError::BadParams(format!(
                "{} bytes exceeds the {} byte limit",
                parameters.len(),
                self.limits.max_parameters_len
            )));
        }
        let decoded = decode_parameters(parameters)?;
        let credentials = self.collaborators.credentials.credentials(owner.pid)?;
        check_entitlement(&decoded, &credentials)?;

        let attributes = ClientAttributes::from_parameters(&decoded, Some(&credentials));
        let id = ClientId::new();
        let entry = ClientEntry::new(
            id,
            &owner,
            Bytes::copy_from_slice(parameters),
            decoded,
            attributes,
        );
        self.clients.write().insert(id, Arc::new(Mutex::new(entry)));
        debug!(client = %id, channel = %channel, "client added");
        Ok(id)
    }

    pub fn remove(&self, channel: ChannelId, client: ClientId) -> Result<(), ClientError> {
        let owner = self.channel(channel)?;
        let entry = self.entry_for(&owner, client, false)?;
        entry.lock().state = ClientState::Removed;
        self.clients.write().remove(&client);
        debug!(client = %client, "client removed");
        Ok(())
    }

    /// Returns the client's parameters as originally encoded
    pub fn copy_parameters(
        &self,
        channel: ChannelId,
        client: ClientId,
    ) -> Result<Bytes, ClientError> {
        let owner = self.channel(channel)?;
        let entry = self.entry_for(&owner, client, true)?;
        let encoded = entry.lock().encoded_parameters.clone();
        Ok(encoded)
    }

    /// Returns the client's encoded result, re-evaluating if it is stale
    pub fn copy_result(
        &self,
        channel: ChannelId,
        client: ClientId,
        buffer_len: usize,
    ) -> Result<Bytes, ClientError> {
        let owner = self.channel(channel)?;
        let entry = self.entry_for(&owner, client, true)?;
        let encoded = self.current_result(client, &entry)?.encoded;

        let available = buffer_len.min(self.limits.max_result_len);
        if encoded.len() > available {
            return Err(ClientError::ResultTruncated {
                needed: encoded.len(),
                available,
            });
        }
        Ok(encoded)
    }

    /// Returns the client's aggregate result, re-evaluating if it is stale
    pub fn result(
        &self,
        channel: ChannelId,
        client: ClientId,
    ) -> Result<core_types::AggregateResult, ClientError> {
        let owner = self.channel(channel)?;
        let entry = self.entry_for(&owner, client, true)?;
        Ok(self.current_result(client, &entry)?.result)
    }

    /// Lists the channel's clients, or every client for an observer
    pub fn copy_list(&self, channel: ChannelId) -> Result<Bytes, ClientError> {
        let owner = self.channel(channel)?;
        let entries: Vec<SharedEntry> = self.clients.read().values().cloned().collect();
        let mut ids: Vec<ClientId> = entries
            .iter()
            .filter_map(|entry| {
                let entry = entry.lock();
                (owner.is_observer() || entry.channel == channel).then_some(entry.id)
            })
            .collect();
        ids.sort();
        Ok(encode_client_list(&ids))
    }

    /// Asks the nexus provider for an instance; the answer arrives through
    /// [`ClientRegistry::nexus_assigned`]
    pub fn request_nexus_instance(
        &self,
        channel: ChannelId,
        client: ClientId,
        agent: Uuid,
    ) -> Result<(), ClientError> {
        let owner = self.channel(channel)?;
        self.entry_for(&owner, client, false)?;
        let request = NexusRequest {
            client,
            pid: owner.pid,
            agent,
        };
        self.collaborators.nexus.request_instance(request)?;
        debug!(client = %client, %agent, "nexus instance requested");
        Ok(())
    }

    /// Records a nexus instance delivered by the provider
    pub fn nexus_assigned(
        &self,
        client: ClientId,
        instance: NexusInstance,
    ) -> Result<(), ClientError> {
        let entry = self.lookup(client)?;
        let mut entry = entry.lock();
        entry.nexus = Some(instance);
        entry.invalidate();
        debug!(client = %client, port = instance.port, "nexus instance recorded");
        Ok(())
    }

    /// Forwards trigger, assert and unassert requests to the agent subsystem
    pub fn agent(
        &self,
        channel: ChannelId,
        client: ClientId,
        actions: &[u8],
    ) -> Result<usize, ClientError> {
        let owner = self.channel(channel)?;
        self.entry_for(&owner, client, false)?;
        let requests: Vec<AgentRequest> = decode_parameters(actions)?
            .into_iter()
            .filter_map(|parameter| {
                let (agent, action) = match parameter {
                    ClientParameter::TriggerAgent(agent) => (agent, AgentAction::Trigger),
                    ClientParameter::AssertAgent(agent) => (agent, AgentAction::Assert),
                    ClientParameter::UnassertAgent(agent) => (agent, AgentAction::Unassert),
                    _ => return None,
                };
                Some(AgentRequest {
                    client,
                    pid: owner.pid,
                    agent,
                    action,
                })
            })
            .collect();
        if requests.is_empty() {
            return Err(ClientError::BadParams("no agent actions".to_string()));
        }
        for request in &requests {
            self.collaborators.agents.request(*request)?;
            debug!(client = %client, agent = %request.agent, action = ?request.action, "agent request sent");
        }
        Ok(requests.len())
    }

    pub fn copy_agent(&self, agent: Uuid) -> Result<Bytes, ClientError> {
        self.collaborators
            .agents
            .agent(agent)
            .map(|info| encode_netagent(&info))
            .ok_or(ClientError::AgentNotFound(agent))
    }

    pub fn copy_interface(&self, index: u32) -> Result<Bytes, ClientError> {
        self.collaborators
            .interfaces
            .by_index(index)
            .map(|details| encode_interface_details(&details))
            .ok_or(ClientError::InterfaceNotFound(index))
    }

    /// Attaches a statistics blob, replacing any previous one
    pub fn set_statistics(
        &self,
        channel: ChannelId,
        client: ClientId,
        blob: &[u8],
    ) -> Result<(), ClientError> {
        let owner = self.channel(channel)?;
        let entry = self.entry_for(&owner, client, false)?;
        let statistics = decode_statistics(blob)?;
        entry.lock().statistics = Some(statistics);
        Ok(())
    }

    pub fn statistics(&self, client: ClientId) -> Result<Option<ClientStatistics>, ClientError> {
        Ok(self.lookup(client)?.lock().statistics)
    }

    pub fn parameters(&self, client: ClientId) -> Result<Vec<ClientParameter>, ClientError> {
        Ok(self.lookup(client)?.lock().parameters.clone())
    }

    /// State of a client as seen against the current environment
    pub fn client_state(&self, client: ClientId) -> ClientState {
        let Ok(entry) = self.lookup(client) else {
            return ClientState::Removed;
        };
        let policy_generation = self.store.generation();
        let interface_generation = self.collaborators.interfaces.generation();
        let state = entry
            .lock()
            .observed_state(policy_generation, interface_generation);
        state
    }

    /// Tears down every channel and client of an exited process
    pub fn process_exited(&self, pid: Pid) -> usize {
        let closed = {
            let mut channels = self.channels.write();
            let before = channels.len();
            channels.retain(|_, channel| channel.pid != pid);
            before - channels.len()
        };
        let removed = self.remove_clients_where(|entry| entry.pid == pid);
        if closed > 0 || removed > 0 {
            info!(pid, channels = closed, clients = removed, "process exited");
        }
        removed
    }

    /// Marks every evaluated client stale after an interface change
    pub fn interfaces_changed(&self) -> usize {
        let entries: Vec<SharedEntry> = self.clients.read().values().cloned().collect();
        let mut invalidated = 0;
        for entry in entries {
            let mut entry = entry.lock();
            if entry.state == ClientState::Evaluated {
                entry.invalidate();
                invalidated += 1;
            }
        }
        debug!(invalidated, "interfaces changed");
        invalidated
    }

    fn current_result(
        &self,
        client: ClientId,
        entry: &SharedEntry,
    ) -> Result<CachedResult, ClientError> {
        let policy_generation = self.store.generation();
        let interface_generation = self.collaborators.interfaces.generation();
        let (attributes, nexus) = {
            let entry = entry.lock();
            if let Some(cache) = &entry.cache {
                if cache.is_current(policy_generation, interface_generation) {
                    return Ok(cache.clone());
                }
            }
            (entry.attributes.clone(), entry.nexus)
        };

        let env = EvaluationEnv::new(&*self.collaborators.interfaces, &*self.collaborators.agents);
        let evaluation = self.store.evaluate(&attributes, &env);
        let routed_generation = self
            .collaborators
            .interfaces
            .by_index(evaluation.result.routed_interface_index)
            .map(|details| details.generation);
        let view = ClientResultView::new(client, &evaluation.result, routed_generation, nexus);
        let cache = CachedResult {
            result: evaluation.result,
            encoded: view.encode(),
            policy_generation: evaluation.generation,
            interface_generation,
        };

        let mut entry = entry.lock();
        if entry.state == ClientState::Removed {
            return Err(ClientError::ClientNotFound(client));
        }
        entry.cache = Some(cache.clone());
        entry.state = ClientState::Evaluated;
        debug!(
            client = %client,
            result = %cache.result.routing_result,
            generation = cache.policy_generation,
            "client evaluated"
        );
        Ok(cache)
    }

    fn channel(&self, channel: ChannelId) -> Result<Channel, ClientError> {
        self.channels
            .read()
            .get(&channel)
            .cloned()
            .ok_or(ClientError::ChannelNotFound(channel))
    }

    fn lookup(&self, client: ClientId) -> Result<SharedEntry, ClientError> {
        self.clients
            .read()
            .get(&client)
            .cloned()
            .ok_or(ClientError::ClientNotFound(client))
    }

    /// Finds a client the channel may act on; observers may read any client
    fn entry_for(
        &self,
        owner: &Channel,
        client: ClientId,
        read_only: bool,
    ) -> Result<SharedEntry, ClientError> {
        let entry = self.lookup(client)?;
        let owned = entry.lock().channel == owner.id;
        if owned || (read_only && owner.is_observer()) {
            Ok(entry)
        } else {
            Err(ClientError::ClientNotFound(client))
        }
    }

    fn remove_clients_where(&self, predicate: impl Fn(&ClientEntry) -> bool) -> usize {
        let mut clients = self.clients.write();
        let before = clients.len();
        clients.retain(|_, entry| {
            let mut entry = entry.lock();
            if predicate(&entry) {
                entry.state = ClientState::Removed;
                false
            } else {
                true
            }
        });
        before - clients.len()
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("channels", &self.channel_count())
            .field("clients", &self.client_count())
            .field("limits", &self.limits)
            .finish()
    }
}

fn check_entitlement(
    parameters: &[ClientParameter],
    credentials: &Credentials,
) -> Result<(), ClientError> {
    let needs = parameters.iter().find(|p| p.requires_entitlement());
    match needs {
        Some(parameter) if !credentials.has_entitlement(MATCH_ENTITLEMENT) => {
            warn!(pid = credentials.pid, %parameter, "parameter needs match entitlement");
            Err(ClientError::PermissionDenied(format!(
                "{} requires {}",
                parameter, MATCH_ENTITLEMENT
            )))
        }
        _ => Ok(()),
    }
}
