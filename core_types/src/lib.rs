//! # Core Types
//!
//! This crate defines the fundamental NECP types shared by every other crate.
//!
//! ## Philosophy
//!
//! Core types are designed with these principles:
//! - **Closed variants**: conditions and results are tagged unions, never raw
//!   type/value pairs. Wire codes only exist at the encoding boundary.
//! - **Type safety first**: policy ids, sessions, clients and channels cannot be
//!   confused with each other.
//! - **Copy at the boundary**: an [`AggregateResult`] handed to a caller is a plain
//!   value, never a view into shared state.
//!
//! ## Key Types
//!
//! - [`Policy`]: an ordered condition/result pair owned by a session
//! - [`Condition`] / [`PolicyCondition`]: what a policy matches on
//! - [`PolicyResult`]: what a matching policy decides
//! - [`RouteRule`]: interface-level allow/deny rules
//! - [`AggregateResult`]: the per-client outcome of evaluation
//! - [`ClientParameter`]: attributes a flow client presents
//! - [`NecpError`]: the protocol error kinds

pub mod aggregate;
pub mod client;
pub mod condition;
pub mod error;
pub mod ids;
pub mod policy;
pub mod result;
pub mod session;
pub mod stats;

pub use aggregate::{
    AggregateResult, ClientResultFlags, NetAgentUse, RoutingParameter, MAX_NETAGENTS,
    SERVICE_FLAGS_REGISTERED,
};
pub use client::{AgentType, ClientParameter, Endpoint, FunctionalType};
pub use condition::{AddressPrefix, AddressRange, Condition, ConditionFlags, PolicyCondition};
pub use error::NecpError;
pub use ids::{ChannelId, ClientId, Pid, PolicyId, PolicyOrder, SessionId, Uid};
pub use policy::Policy;
pub use result::{PolicyResult, ResultKind, RouteRule, RouteRuleAction, RouteRuleFlags};
pub use session::SessionPriority;
pub use stats::{
    BasicMetadata, ClientStatistics, ExtraTcpMetadata, StatCounts, StatsHeader, TcpProbeStatus,
};
