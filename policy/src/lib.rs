//! # Policy Store and Evaluation
//!
//! This crate owns NECP policies: sessions stage them, `apply_all` commits them,
//! and flow clients are evaluated against the committed set.
//!
//! ## Philosophy
//!
//! - **Stage, then commit**: edits are private to their session until applied
//! - **Snapshots, not locks**: evaluation reads an immutable `Arc` snapshot and
//!   never blocks behind an in-flight edit
//! - **Ids are forever**: a policy id is never handed out twice
//! - **Evaluation is pure**: it reads the snapshot and collaborators, and changes
//!   nothing
//!
//! ## Key Types
//!
//! - [`PolicyStore`]: sessions, staged policies and the applied snapshot
//! - [`PolicySnapshot`]: an immutable applied policy set
//! - [`ClientAttributes`]: what conditions are matched against
//! - [`EvaluationEnv`]: interface and agent collaborators used while routing

pub mod evaluate;
pub mod snapshot;
pub mod store;
pub mod validate;

pub use evaluate::{condition_matches, domain_matches, evaluate, ClientAttributes, EvaluationEnv};
pub use snapshot::{AppliedPolicy, PolicySnapshot};
pub use store::{Evaluation, PolicyStore};
pub use validate::{validate_conditions, validate_policy, validate_result, MAX_INTERFACE_NAME_LEN};
