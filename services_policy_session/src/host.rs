//! Context lifecycle
//!
//! The host creates the [`NecpContext`] when the first session or channel opens
//! and drops it when the last one closes. Anything still holding the old context
//! keeps a working, but detached, copy.

use core_types::{ChannelId, NecpError, Pid, SessionId};
use kernel_api::{Collaborators, KernelError};
use parking_lot::Mutex;
use services_client_registry::{ChannelFlags, ClientError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::{NecpConfig, NecpContext};
use crate::session::PolicySession;

/// Errors from opening and closing sessions and channels
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    /// Only root may open a control session
    #[error("Process {0} may not open a control session")]
    NotPrivileged(Pid),

    #[error("Session not open: {0}")]
    SessionNotOpen(SessionId),

    #[error("Channel not open: {0}")]
    ChannelNotOpen(ChannelId),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("NECP error: {0}")]
    Necp(#[from] NecpError),
}

#[derive(Debug, Default)]
struct HostState {
    context: Option<Arc<NecpContext>>,
    sessions: HashMap<SessionId, Pid>,
    channels: HashMap<ChannelId, Pid>,
}

impl HostState {
    fn context(&mut self, collaborators: &Collaborators, config: NecpConfig) -> Arc<NecpContext> {
        let context = self.context.get_or_insert_with(|| {
            info!("necp context created");
            Arc::new(NecpContext::new(collaborators.clone(), config))
        });
        Arc::clone(context)
    }

    fn release_if_idle(&mut self) {
        if self.sessions.is_empty() && self.channels.is_empty() && self.context.take().is_some() {
            info!("necp context released");
        }
    }
}

/// Owner of the process-wide NECP context
#[derive(Debug)]
pub struct NecpHost {
    collaborators: Collaborators,
    config: NecpConfig,
    state: Mutex<HostState>,
}

impl NecpHost {
    pub fn new(collaborators: Collaborators, config: NecpConfig) -> Self {
        Self {
            collaborators,
            config,
            state: Mutex::new(HostState::default()),
        }
    }

    /// The live context, if any session or channel is open
    pub fn context(&self) -> Option<Arc<NecpContext>> {
        self.state.lock().context.clone()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn channel_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    /// Opens a control session for a root process
    pub fn open_session(&self, pid: Pid, name: &str) -> Result<PolicySession, HostError> {
        let credentials = self.collaborators.credentials.credentials(pid)?;
        if !credentials.is_root() {
            warn!(pid, uid = credentials.uid, "control session refused");
            return Err(HostError::NotPrivileged(pid));
        }
        let mut state = self.state.lock();
        let context = state.context(&self.collaborators, self.config);
        let session = PolicySession::open(Arc::clone(context.store()), pid, name);
        state.sessions.insert(session.id(), pid);
        debug!(session = %session.id(), pid, name, "session opened");
        Ok(session)
    }

    pub fn close_session(&self, session: PolicySession) -> Result<(), HostError> {
        let id = session.id();
        let mut state = self.state.lock();
        if !state.sessions.contains_key(&id) {
            return Err(HostError::SessionNotOpen(id));
        }
        // Forgotten and released even when the store has already dropped it
        let closed = session.close();
        state.sessions.remove(&id);
        state.release_if_idle();
        closed?;
        debug!(session = %id, "session closed");
        Ok(())
    }

    /// Opens a client channel and returns it with the context it lives in
    pub fn open_channel(
        &self,
        pid: Pid,
        flags: ChannelFlags,
    ) -> Result<(Arc<NecpContext>, ChannelId), HostError> {
        let context = self.state.lock().context(&self.collaborators, self.config);
        let opened = context.registry().open_channel(pid, flags);
        let mut state = self.state.lock();
        match opened {
            Ok(channel) => {
                state.channels.insert(channel, pid);
                Ok((context, channel))
            }
            Err(error) => {
                state.release_if_idle();
                Err(error.into())
            }
        }
    }

    pub fn close_channel(&self, channel: ChannelId) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.channels.remove(&channel).is_none() {
            return Err(HostError::ChannelNotOpen(channel));
        }
        if let Some(context) = &state.context {
            context.registry().close_channel(channel)?;
        }
        state.release_if_idle();
        Ok(())
    }

    /// Drops every channel of an exited process. Sessions are owned by their
    /// holder and are closed through [`NecpHost::close_session`].
    pub fn process_exited(&self, pid: Pid) -> usize {
        let mut state = self.state.lock();
        state.channels.retain(|_, owner| *owner != pid);
        let removed = state
            .context
            .as_ref()
            .map_or(0, |context| context.registry().process_exited(pid));
        state.release_if_idle();
        removed
    }
}
