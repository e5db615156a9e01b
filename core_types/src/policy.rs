//! Policy records

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::condition::PolicyCondition;
use crate::ids::{PolicyId, PolicyOrder, SessionId};
use crate::result::PolicyResult;

/// A policy as stored and evaluated
///
/// Policies are never edited in place. Replacing one means deleting it and adding
/// a new one with a fresh id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub order: PolicyOrder,
    pub owner: SessionId,
    pub conditions: Vec<PolicyCondition>,
    pub result: PolicyResult,
}

impl Policy {
    /// True if this policy has the same order, conditions and result as `other`
    pub fn same_rule_as(&self, other: &Policy) -> bool {
        self.order == other.order
            && self.conditions == other.conditions
            && self.result == other.result
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} order={} result={}", self.id, self.order, self.result)?;
        for condition in &self.conditions {
            write!(f, " [{}]", condition)?;
        }
        Ok(())
    }
}
