//! Applied policy snapshots
//!
//! A snapshot is the immutable policy set evaluation runs against. Commits build a
//! new snapshot and swap it in; readers keep whatever `Arc` they already hold.

use core_types::{Policy, PolicyId, SessionId, SessionPriority};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// A policy as committed, with the session context it was applied under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedPolicy {
    pub policy: Policy,
    /// Priority of the owning session at apply time
    pub priority: SessionPriority,
    pub session_order: u32,
    pub owner_name: String,
}

impl AppliedPolicy {
    fn sort_key(&self) -> (SessionPriority, u32, PolicyId) {
        (self.priority, self.policy.order, self.policy.id)
    }
}

/// Immutable view of the applied policy set and registered services
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    generation: u64,
    policies: Arc<Vec<AppliedPolicy>>,
    services: Arc<BTreeSet<Uuid>>,
}

impl PolicySnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Commit counter; bumped by every apply and service change
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Applied policies in evaluation order
    pub fn policies(&self) -> &[AppliedPolicy] {
        &self.policies
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn get(&self, id: PolicyId) -> Option<&AppliedPolicy> {
        self.policies.iter().find(|applied| applied.policy.id == id)
    }

    pub fn is_service_registered(&self, service: &Uuid) -> bool {
        self.services.contains(service)
    }

    pub fn services(&self) -> impl Iterator<Item = &Uuid> {
        self.services.iter()
    }

    /// Builds the successor snapshot with `owner`'s policies replaced
    pub(crate) fn replace_session(
        &self,
        owner: SessionId,
        entries: impl IntoIterator<Item = AppliedPolicy>,
    ) -> Self {
        let mut policies: Vec<AppliedPolicy> = self
            .policies
            .iter()
            .filter(|applied| applied.policy.owner != owner)
            .cloned()
            .collect();
        policies.extend(entries);
        policies.sort_by_key(AppliedPolicy::sort_key);
        debug_assert!(
            policies
                .windows(2)
                .all(|pair| pair[0].policy.id != pair[1].policy.id),
            "duplicate policy id in snapshot"
        );
        Self {
            generation: self.generation + 1,
            policies: Arc::new(policies),
            services: Arc::clone(&self.services),
        }
    }

    /// Builds the successor snapshot with a new service set
    pub(crate) fn with_services(&self, services: BTreeSet<Uuid>) -> Self {
        Self {
            generation: self.generation + 1,
            policies: Arc::clone(&self.policies),
            services: Arc::new(services),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Condition, PolicyCondition, PolicyResult};

    fn applied(id: u32, order: u32, owner: SessionId, priority: SessionPriority) -> AppliedPolicy {
        AppliedPolicy {
            policy: Policy {
                id: PolicyId::new(id),
                order,
                owner,
                conditions: vec![PolicyCondition::new(Condition::Default)],
                result: PolicyResult::Pass,
            },
            priority,
            session_order: 1,
            owner_name: "test".to_string(),
        }
    }

    #[test]
    fn test_priority_band_sorts_first() {
        let low = SessionId::new();
        let control = SessionId::new();
        let snapshot = PolicySnapshot::empty()
            .replace_session(low, vec![applied(1, 1, low, SessionPriority::Low)])
            .replace_session(
                control,
                vec![applied(2, 100, control, SessionPriority::Control)],
            );
        let ids: Vec<u32> = snapshot.policies().iter().map(|a| a.policy.id.get()).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(snapshot.generation(), 2);
    }

    #[test]
    fn test_replace_keeps_other_sessions() {
        let a = SessionId::new();
        let b = SessionId::new();
        let snapshot = PolicySnapshot::empty()
            .replace_session(a, vec![applied(1, 5, a, SessionPriority::Default)])
            .replace_session(b, vec![applied(2, 5, b, SessionPriority::Default)])
            .replace_session(a, Vec::new());
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(PolicyId::new(2)).is_some());
        assert!(snapshot.get(PolicyId::new(1)).is_none());
    }

    #[test]
    fn test_services_share_policies() {
        let service = Uuid::new_v4();
        let snapshot = PolicySnapshot::empty().with_services([service].into_iter().collect());
        assert!(snapshot.is_service_registered(&service));
        assert_eq!(snapshot.generation(), 1);
        assert!(snapshot.is_empty());
    }
}
