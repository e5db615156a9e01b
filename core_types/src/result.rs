//! Policy results and route rules

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::ids::PolicyOrder;

/// Discriminant of a [`PolicyResult`], carrying the wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResultKind {
    Pass = 1,
    SkipToOrder = 2,
    Drop = 3,
    SocketDivert = 4,
    SocketFilter = 5,
    IpTunnel = 6,
    IpFilter = 7,
    Trigger = 8,
    TriggerIfNeeded = 9,
    TriggerScoped = 10,
    NoTriggerScoped = 11,
    SocketScoped = 12,
    RouteRules = 13,
    UseNetAgent = 14,
}

impl ResultKind {
    /// Returns the wire code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parses a wire code, returning None for unknown kinds
    pub fn from_code(code: u8) -> Option<Self> {
        let kind = match code {
            1 => ResultKind::Pass,
            2 => ResultKind::SkipToOrder,
            3 => ResultKind::Drop,
            4 => ResultKind::SocketDivert,
            5 => ResultKind::SocketFilter,
            6 => ResultKind::IpTunnel,
            7 => ResultKind::IpFilter,
            8 => ResultKind::Trigger,
            9 => ResultKind::TriggerIfNeeded,
            10 => ResultKind::TriggerScoped,
            11 => ResultKind::NoTriggerScoped,
            12 => ResultKind::SocketScoped,
            13 => ResultKind::RouteRules,
            14 => ResultKind::UseNetAgent,
            _ => return None,
        };
        Some(kind)
    }

    /// Terminal kinds decide the routing result and stop evaluation
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResultKind::Pass
                | ResultKind::Drop
                | ResultKind::SocketDivert
                | ResultKind::IpTunnel
                | ResultKind::IpFilter
                | ResultKind::SocketScoped
                | ResultKind::RouteRules
        )
    }

    pub fn is_trigger(self) -> bool {
        matches!(
            self,
            ResultKind::Trigger
                | ResultKind::TriggerIfNeeded
                | ResultKind::TriggerScoped
                | ResultKind::NoTriggerScoped
        )
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultKind::Pass => "Pass",
            ResultKind::SkipToOrder => "SkipToOrder",
            ResultKind::Drop => "Drop",
            ResultKind::SocketDivert => "SocketDivert",
            ResultKind::SocketFilter => "SocketFilter",
            ResultKind::IpTunnel => "IpTunnel",
            ResultKind::IpFilter => "IpFilter",
            ResultKind::Trigger => "Trigger",
            ResultKind::TriggerIfNeeded => "TriggerIfNeeded",
            ResultKind::TriggerScoped => "TriggerScoped",
            ResultKind::NoTriggerScoped => "NoTriggerScoped",
            ResultKind::SocketScoped => "SocketScoped",
            ResultKind::RouteRules => "RouteRules",
            ResultKind::UseNetAgent => "UseNetAgent",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Interface classes a route rule applies to; empty means all interfaces
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RouteRuleFlags: u8 {
        const CELLULAR = 0x01;
        const WIFI = 0x02;
        const WIRED = 0x04;
        const EXPENSIVE = 0x08;
    }
}

/// Action taken by a route rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RouteRuleAction {
    Deny = 1,
    Allow = 2,
    QosMarking = 3,
}

impl RouteRuleAction {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RouteRuleAction::Deny),
            2 => Some(RouteRuleAction::Allow),
            3 => Some(RouteRuleAction::QosMarking),
            _ => None,
        }
    }
}

/// An interface-level rule inside a `RouteRules` result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteRule {
    pub action: RouteRuleAction,
    /// Interface name; empty selects by `flags` instead
    #[serde(default)]
    pub interface_name: String,
    #[serde(default)]
    pub flags: RouteRuleFlags,
}

impl RouteRule {
    pub fn new(action: RouteRuleAction) -> Self {
        Self {
            action,
            interface_name: String::new(),
            flags: RouteRuleFlags::empty(),
        }
    }

    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interface_name = name.into();
        self
    }

    pub fn with_flags(mut self, flags: RouteRuleFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl fmt::Display for RouteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.action {
            RouteRuleAction::Deny => "Deny",
            RouteRuleAction::Allow => "Allow",
            RouteRuleAction::QosMarking => "QosMarking",
        };
        if self.interface_name.is_empty() {
            write!(f, "{} flags={:#04x}", action, self.flags.bits())
        } else {
            write!(f, "{} {}", action, self.interface_name)
        }
    }
}

/// The outcome a matching policy decides
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PolicyResult {
    Pass,
    /// Continue evaluation at the first policy with at least this order
    SkipToOrder(PolicyOrder),
    Drop,
    /// Divert matching sockets to a control unit
    SocketDivert(u32),
    /// Attach a socket content filter by control unit
    SocketFilter(u32),
    /// Route through the named tunnel interface
    IpTunnel(String),
    IpFilter,
    Trigger(Uuid),
    TriggerIfNeeded(Uuid),
    TriggerScoped(Uuid),
    NoTriggerScoped(Uuid),
    /// Scope sockets to the named interface
    SocketScoped(String),
    RouteRules(Vec<RouteRule>),
    UseNetAgent(Uuid),
}

impl PolicyResult {
    pub fn kind(&self) -> ResultKind {
        match self {
            PolicyResult::Pass => ResultKind::Pass,
            PolicyResult::SkipToOrder(_) => ResultKind::SkipToOrder,
            PolicyResult::Drop => ResultKind::Drop,
            PolicyResult::SocketDivert(_) => ResultKind::SocketDivert,
            PolicyResult::SocketFilter(_) => ResultKind::SocketFilter,
            PolicyResult::IpTunnel(_) => ResultKind::IpTunnel,
            PolicyResult::IpFilter => ResultKind::IpFilter,
            PolicyResult::Trigger(_) => ResultKind::Trigger,
            PolicyResult::TriggerIfNeeded(_) => ResultKind::TriggerIfNeeded,
            PolicyResult::TriggerScoped(_) => ResultKind::TriggerScoped,
            PolicyResult::NoTriggerScoped(_) => ResultKind::NoTriggerScoped,
            PolicyResult::SocketScoped(_) => ResultKind::SocketScoped,
            PolicyResult::RouteRules(_) => ResultKind::RouteRules,
            PolicyResult::UseNetAgent(_) => ResultKind::UseNetAgent,
        }
    }

    /// Returns the service uuid of a trigger-family result
    pub fn service_uuid(&self) -> Option<Uuid> {
        match self {
            PolicyResult::Trigger(uuid)
            | PolicyResult::TriggerIfNeeded(uuid)
            | PolicyResult::TriggerScoped(uuid)
            | PolicyResult::NoTriggerScoped(uuid) => Some(*uuid),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyResult::SkipToOrder(order) => write!(f, "SkipToOrder ({})", order),
            PolicyResult::SocketDivert(unit) => write!(f, "SocketDivert ({})", unit),
            PolicyResult::SocketFilter(unit) => write!(f, "SocketFilter ({})", unit),
            PolicyResult::IpTunnel(name) => write!(f, "IpTunnel ({})", name),
            PolicyResult::SocketScoped(name) => write!(f, "SocketScoped ({})", name),
            PolicyResult::Trigger(uuid)
            | PolicyResult::TriggerIfNeeded(uuid)
            | PolicyResult::TriggerScoped(uuid)
            | PolicyResult::NoTriggerScoped(uuid)
            | PolicyResult::UseNetAgent(uuid) => write!(f, "{} ({})", self.kind(), uuid),
            PolicyResult::RouteRules(rules) => {
                write!(f, "RouteRules (")?;
                for (i, rule) in rules.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", rule)?;
                }
                write!(f, ")")
            }
            PolicyResult::Pass | PolicyResult::Drop | PolicyResult::IpFilter => {
                write!(f, "{}", self.kind())
            }
        }
    }
}
