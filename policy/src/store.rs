//! The policy store
//!
//! Sessions stage edits privately; `apply_all` is the only way staged policies
//! reach evaluation. Applied state lives in an `Arc<PolicySnapshot>` that commits
//! replace wholesale, so an evaluation sees either all of a batch or none of it.

use core_types::{
    AggregateResult, NecpError, Pid, Policy, PolicyCondition, PolicyId, PolicyOrder,
    PolicyResult, SessionId, SessionPriority,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::evaluate::{evaluate, ClientAttributes, EvaluationEnv};
use crate::snapshot::{AppliedPolicy, PolicySnapshot};
use crate::validate::validate_policy;

/// Per-session bookkeeping
#[derive(Debug)]
struct SessionState {
    name: String,
    priority: SessionPriority,
    session_order: u32,
    locked_pid: Option<Pid>,
    staged: BTreeMap<PolicyId, Policy>,
    services: BTreeSet<Uuid>,
}

/// Outcome of one evaluation together with the snapshot generation it saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub result: AggregateResult,
    pub generation: u64,
}

/// Process-wide policy store shared by all sessions
pub struct PolicyStore {
    next_policy_id: AtomicU32,
    next_session_order: AtomicU32,
    sessions: Mutex<HashMap<SessionId, SessionState>>,
    applied: RwLock<Arc<PolicySnapshot>>,
    /// Serializes commits; held while the successor snapshot is built
    commit: Mutex<()>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self {
            next_policy_id: AtomicU32::new(1),
            next_session_order: AtomicU32::new(1),
            sessions: Mutex::new(HashMap::new()),
            applied: RwLock::new(Arc::new(PolicySnapshot::empty())),
            commit: Mutex::new(()),
        }
    }

    /// Creates a session with default priority
    pub fn create_session(&self, name: impl Into<String>) -> SessionId {
        let id = SessionId::new();
        let name = name.into();
        let session_order = self.next_session_order.fetch_add(1, Ordering::Relaxed);
        debug!(session = %id, name = %name, session_order, "session created");
        self.sessions.lock().insert(
            id,
            SessionState {
                name,
                priority: SessionPriority::Default,
                session_order,
                locked_pid: None,
                staged: BTreeMap::new(),
                services: BTreeSet::new(),
            },
        );
        id
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn has_session(&self, session: SessionId) -> bool {
        self.sessions.lock().contains_key(&session)
    }

    /// Checks that `pid` may issue commands on `session`
    pub fn authorize(&self, session: SessionId, pid: Pid) -> Result<(), NecpError> {
        self.with_session(session, |state| match state.locked_pid {
            Some(locked) if locked != pid => {
                warn!(session = %session, pid, locked, "command from foreign process");
                Err(NecpError::InvalidProcess)
            }
            _ => Ok(()),
        })
    }

    /// Stages a new policy and returns its id
    pub fn add(
        &self,
        session: SessionId,
        order: PolicyOrder,
        conditions: Vec<PolicyCondition>,
        result: PolicyResult,
    ) -> Result<PolicyId, NecpError> {
        if let Err(error) = validate_policy(&conditions, &result) {
            warn!(session = %session, order, %error, "policy rejected");
            return Err(error);
        }
        self.with_session(session, |state| {
            let id = PolicyId::new(self.next_policy_id.fetch_add(1, Ordering::Relaxed));
            let policy = Policy {
                id,
                order,
                owner: session,
                conditions,
                result,
            };
            debug!(session = %session, policy = %policy, "policy staged");
            let previous = state.staged.insert(id, policy);
            debug_assert!(previous.is_none(), "policy id {} assigned twice", id);
            Ok(id)
        })
    }

    /// Returns a staged policy of this session
    pub fn get(&self, session: SessionId, id: PolicyId) -> Result<Policy, NecpError> {
        self.with_session(session, |state| {
            state
                .staged
                .get(&id)
                .cloned()
                .ok_or(NecpError::PolicyIdNotFound)
        })
    }

    pub fn delete(&self, session: SessionId, id: PolicyId) -> Result<(), NecpError> {
        self.with_session(session, |state| match state.staged.remove(&id) {
            Some(_) => {
                debug!(session = %session, policy = %id, "policy deleted");
                Ok(())
            }
            None => Err(NecpError::PolicyIdNotFound),
        })
    }

    /// Drops every staged policy of the session
    pub fn delete_all(&self, session: SessionId) -> Result<(), NecpError> {
        self.with_session(session, |state| {
            debug!(session = %session, count = state.staged.len(), "all policies deleted");
            state.staged.clear();
            Ok(())
        })
    }

    /// Staged policy ids ordered by (order, id)
    pub fn list_all(&self, session: SessionId) -> Result<Vec<PolicyId>, NecpError> {
        self.with_session(session, |state| {
            let mut policies: Vec<(PolicyOrder, PolicyId)> = state
                .staged
                .values()
                .map(|policy| (policy.order, policy.id))
                .collect();
            policies.sort_unstable();
            Ok(policies.into_iter().map(|(_, id)| id).collect())
        })
    }

    /// Commits the session's staged policies into the applied snapshot
    pub fn apply_all(&self, session: SessionId) -> Result<u64, NecpError> {
        let _commit = self.commit.lock();
        let entries = self.with_session(session, |state| {
            Ok(state
                .staged
                .values()
                .map(|policy| AppliedPolicy {
                    policy: policy.clone(),
                    priority: state.priority,
                    session_order: state.session_order,
                    owner_name: state.name.clone(),
                })
                .collect::<Vec<_>>())
        })?;
        let count = entries.len();
        let generation = self.commit_snapshot(|current| current.replace_session(session, entries));
        info!(session = %session, policies = count, generation, "policies applied");
        Ok(generation)
    }

    /// Changes the priority used by the session's next apply
    pub fn set_priority(
        &self,
        session: SessionId,
        priority: SessionPriority,
    ) -> Result<(), NecpError> {
        self.with_session(session, |state| {
            debug!(session = %session, %priority, "session priority set");
            state.priority = priority;
            Ok(())
        })
    }

    /// Restricts the session to commands from `pid`
    pub fn lock_to_process(&self, session: SessionId, pid: Pid) -> Result<(), NecpError> {
        self.with_session(session, |state| {
            debug!(session = %session, pid, "session locked to process");
            state.locked_pid = Some(pid);
            Ok(())
        })
    }

    pub fn register_service(&self, session: SessionId, service: Uuid) -> Result<(), NecpError> {
        self.update_services(session, |services| {
            services.insert(service);
        })?;
        info!(session = %session, %service, "service registered");
        Ok(())
    }

    /// Unregistering a service the session never registered succeeds
    pub fn unregister_service(&self, session: SessionId, service: Uuid) -> Result<(), NecpError> {
        self.update_services(session, |services| {
            services.remove(&service);
        })?;
        info!(session = %session, %service, "service unregistered");
        Ok(())
    }

    /// Removes the session, its applied policies and its services
    pub fn close_session(&self, session: SessionId) -> Result<(), NecpError> {
        let _commit = self.commit.lock();
        let services = {
            let mut sessions = self.sessions.lock();
            if sessions.remove(&session).is_none() {
                return Err(NecpError::InvalidProcess);
            }
            union_services(&sessions)
        };
        let generation = self.commit_snapshot(|current| {
            current
                .replace_session(session, Vec::new())
                .with_services(services)
        });
        info!(session = %session, generation, "session closed");
        Ok(())
    }

    /// The current applied snapshot
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&*self.applied.read())
    }

    pub fn generation(&self) -> u64 {
        self.applied.read().generation()
    }

    /// Evaluates a client against the current applied snapshot.
    ///
    /// No store lock is held while collaborators are consulted.
    pub fn evaluate(&self, client: &ClientAttributes, env: &EvaluationEnv<'_>) -> Evaluation {
        let snapshot = self.snapshot();
        Evaluation {
            result: evaluate(&snapshot, client, env),
            generation: snapshot.generation(),
        }
    }

    fn with_session<T>(
        &self,
        session: SessionId,
        f: impl FnOnce(&mut SessionState) -> Result<T, NecpError>,
    ) -> Result<T, NecpError> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&session) {
            Some(state) => f(state),
            None => Err(NecpError::InvalidProcess),
        }
    }

    fn update_services(
        &self,
        session: SessionId,
        f: impl FnOnce(&mut BTreeSet<Uuid>),
    ) -> Result<(), NecpError> {
        let _commit = self.commit.lock();
        let services = {
            let mut sessions = self.sessions.lock();
            let state = sessions
                .get_mut(&session)
                .ok_or(NecpError::InvalidProcess)?;
            f(&mut state.services);
            union_services(&sessions)
        };
        self.commit_snapshot(|current| current.with_services(services));
        Ok(())
    }

    /// Builds and installs a successor snapshot; callers hold the commit lock
    fn commit_snapshot(&self, build: impl FnOnce(&PolicySnapshot) -> PolicySnapshot) -> u64 {
        let current = self.snapshot();
        let next = Arc::new(build(&current));
        let generation = next.generation();
        *self.applied.write() = next;
        generation
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore")
            .field("sessions", &self.session_count())
            .field("generation", &self.generation())
            .finish()
    }
}

fn union_services(sessions: &HashMap<SessionId, SessionState>) -> BTreeSet<Uuid> {
    sessions
        .values()
        .flat_map(|state| state.services.iter().copied())
        .collect()
}
