//! Per-client state

use bitflags::bitflags;
use bytes::Bytes;
use core_types::{AggregateResult, ChannelId, ClientId, ClientParameter, ClientStatistics, Pid};
use kernel_api::NexusInstance;
use policy::ClientAttributes;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Flags a process passes when opening a channel
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ChannelFlags: u32 {
        /// May list every client, not just its own; requires root
        const OBSERVER = 0x01;
    }
}

/// A process's handle for registering flow clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub pid: Pid,
    pub flags: ChannelFlags,
}

impl Channel {
    pub fn is_observer(&self) -> bool {
        self.flags.contains(ChannelFlags::OBSERVER)
    }
}

/// Lifecycle of a client entry
///
/// `Registered -> (Evaluated <-> Stale) -> Removed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientState {
    /// Added but never evaluated
    Registered,
    /// Holds a result computed against the current environment
    Evaluated,
    /// Holds a result the environment has since moved past
    Stale,
    Removed,
}

/// A cached evaluation and the environment it was computed in
#[derive(Debug, Clone)]
pub(crate) struct CachedResult {
    pub result: AggregateResult,
    pub encoded: Bytes,
    pub policy_generation: u64,
    pub interface_generation: u64,
}

impl CachedResult {
    pub fn is_current(&self, policy_generation: u64, interface_generation: u64) -> bool {
        self.policy_generation == policy_generation
            && self.interface_generation == interface_generation
    }
}

#[derive(Debug)]
pub(crate) struct ClientEntry {
    pub id: ClientId,
    pub channel: ChannelId,
    pub pid: Pid,
    /// Parameters exactly as the client supplied them
    pub encoded_parameters: Bytes,
    pub parameters: Vec<ClientParameter>,
    pub attributes: ClientAttributes,
    pub state: ClientState,
    pub cache: Option<CachedResult>,
    pub nexus: Option<NexusInstance>,
    pub statistics: Option<ClientStatistics>,
}

impl ClientEntry {
    pub fn new(
        id: ClientId,
        channel: &Channel,
        encoded_parameters: Bytes,
        parameters: Vec<ClientParameter>,
        attributes: ClientAttributes,
    ) -> Self {
        Self {
            id,
            channel: channel.id,
            pid: channel.pid,
            encoded_parameters,
            parameters,
            attributes,
            state: ClientState::Registered,
            cache: None,
            nexus: None,
            statistics: None,
        }
    }

    /// Drops the cached result, keeping the state machine consistent
    pub fn invalidate(&mut self) {
        if self.state == ClientState::Evaluated {
            self.state = ClientState::Stale;
        }
        self.cache = None;
    }

    /// State as seen against the current environment
    pub fn observed_state(&self, policy_generation: u64, interface_generation: u64) -> ClientState {
        match (&self.state, &self.cache) {
            (ClientState::Evaluated, Some(cache))
                if !cache.is_current(policy_generation, interface_generation) =>
            {
                ClientState::Stale
            }
            (state, _) => *state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ClientEntry {
        let channel = Channel {
            id: ChannelId::new(),
            pid: 1,
            flags: ChannelFlags::empty(),
        };
        ClientEntry::new(
            ClientId::new(),
            &channel,
            Bytes::new(),
            Vec::new(),
            ClientAttributes::default(),
        )
    }

    #[test]
    fn test_new_entry_is_registered() {
        let entry = entry();
        assert_eq!(entry.observed_state(0, 0), ClientState::Registered);
    }

    #[test]
    fn test_generation_change_is_stale() {
        let mut entry = entry();
        entry.state = ClientState::Evaluated;
        entry.cache = Some(CachedResult {
            result: AggregateResult::pass(),
            encoded: Bytes::new(),
            policy_generation: 3,
            interface_generation: 1,
        });
        assert_eq!(entry.observed_state(3, 1), ClientState::Evaluated);
        assert_eq!(entry.observed_state(4, 1), ClientState::Stale);
        assert_eq!(entry.observed_state(3, 2), ClientState::Stale);

        entry.invalidate();
        assert_eq!(entry.state, ClientState::Stale);
        assert!(entry.cache.is_none());
    }
}
