//! Request Audit Log
//!
//! Records every agent and nexus request the simulated collaborators receive.
//! This is for proving request routing in tests, not production observability.

use kernel_api::{AgentRequest, NexusRequest};
use serde::Serialize;

/// What a collaborator was asked to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RequestEvent {
    Agent(AgentRequest),
    Nexus(NexusRequest),
}

/// A recorded request and whether the collaborator accepted it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestAuditEvent {
    /// Position in the log, starting at 0
    pub sequence: u64,
    pub event: RequestEvent,
    pub accepted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RequestAuditLog {
    events: Vec<RequestAuditEvent>,
}

impl RequestAuditLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: RequestEvent, accepted: bool) {
        let sequence = self.events.len() as u64;
        self.events.push(RequestAuditEvent {
            sequence,
            event,
            accepted,
        });
    }

    pub fn events(&self) -> &[RequestAuditEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Counts events matching a predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&RequestAuditEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}
