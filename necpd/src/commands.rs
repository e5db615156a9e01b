//! # Script Commands
//!
//! One script line is one command.
//!
//! ## Command Set
//!
//! - `policy add <order> <result> [cond ...]` - Stage a policy
//! - `policy get <id>` / `policy delete <id>` - Read or remove a staged policy
//! - `policy list` / `policy apply` / `policy clear` / `policy dump`
//! - `session priority <1-5>` / `session lock`
//! - `service register <uuid>` / `service unregister <uuid>`
//! - `client add [param ...]` - Register a flow client
//! - `client result <n>` / `client remove <n>` / `client list`
//! - `interfaces bump` - Advance the interface generation
//!
//! Results are written `drop`, `skip=20`, `tunnel=utun0`,
//! `route-rules=deny:cellular,allow:en0` and so on; conditions are written
//! `domain=apple.com`, `remote=10.0.0.0/8`, and are negated with a leading `!`.

use core_types::{
    AddressPrefix, AddressRange, AgentType, ClientParameter, Condition, FunctionalType,
    PolicyCondition, PolicyId, PolicyOrder, PolicyResult, RouteRule, RouteRuleAction,
    RouteRuleFlags, SessionPriority,
};
use necp_wire::Command;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Script command error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptCommandError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// Script commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCommand {
    PolicyAdd {
        order: PolicyOrder,
        conditions: Vec<PolicyCondition>,
        result: PolicyResult,
    },
    PolicyGet(PolicyId),
    PolicyDelete(PolicyId),
    PolicyList,
    PolicyApply,
    PolicyClear,
    PolicyDump,
    SessionPriority(SessionPriority),
    SessionLock,
    ServiceRegister(Uuid),
    ServiceUnregister(Uuid),
    /// Register a client; clients are numbered from 1 in the order added
    ClientAdd(Vec<ClientParameter>),
    ClientResult(usize),
    ClientRemove(usize),
    ClientList,
    InterfacesBump,
}

impl ScriptCommand {
    /// The control packet command, for commands sent through the session
    pub fn to_command(&self) -> Option<Command> {
        let command = match self {
            ScriptCommand::PolicyAdd {
                order,
                conditions,
                result,
            } => Command::PolicyAdd {
                order: *order,
                conditions: conditions.clone(),
                result: result.clone(),
            },
            ScriptCommand::PolicyGet(id) => Command::PolicyGet(*id),
            ScriptCommand::PolicyDelete(id) => Command::PolicyDelete(*id),
            ScriptCommand::PolicyList => Command::PolicyListAll,
            ScriptCommand::PolicyApply => Command::PolicyApplyAll,
            ScriptCommand::PolicyClear => Command::PolicyDeleteAll,
            ScriptCommand::PolicyDump => Command::PolicyDumpAll,
            ScriptCommand::SessionPriority(priority) => Command::SetSessionPriority(*priority),
            ScriptCommand::SessionLock => Command::LockSessionToProc,
            ScriptCommand::ServiceRegister(uuid) => Command::RegisterService(*uuid),
            ScriptCommand::ServiceUnregister(uuid) => Command::UnregisterService(*uuid),
            ScriptCommand::ClientAdd(_)
            | ScriptCommand::ClientResult(_)
            | ScriptCommand::ClientRemove(_)
            | ScriptCommand::ClientList
            | ScriptCommand::InterfacesBump => return None,
        };
        Some(command)
    }
}

/// Script command parser
pub struct ScriptCommandParser;

impl ScriptCommandParser {
    /// Parses a command string
    pub fn parse(input: &str) -> Result<ScriptCommand, ScriptCommandError> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some((group, rest)) = parts.split_first() else {
            return Err(ScriptCommandError::InvalidCommand(
                "Empty command".to_string(),
            ));
        };
        let Some((verb, args)) = rest.split_first() else {
            return Err(ScriptCommandError::MissingArgument(format!(
                "{} subcommand",
                group
            )));
        };

        match (group.to_lowercase().as_str(), verb.to_lowercase().as_str()) {
            ("policy", "add") => Self::parse_policy_add(args),
            ("policy", "get") => Ok(ScriptCommand::PolicyGet(Self::policy_id(args)?)),
            ("policy", "delete") => Ok(ScriptCommand::PolicyDelete(Self::policy_id(args)?)),
            ("policy", "list") => Ok(ScriptCommand::PolicyList),
            ("policy", "apply") => Ok(ScriptCommand::PolicyApply),
            ("policy", "clear") => Ok(ScriptCommand::PolicyClear),
            ("policy", "dump") => Ok(ScriptCommand::PolicyDump),
            ("session", "priority") => {
                let code: u32 = number(first(args, "priority")?)?;
                SessionPriority::from_code(code)
                    .map(ScriptCommand::SessionPriority)
                    .ok_or_else(|| invalid(format!("priority {} (expected 1-5)", code)))
            }
            ("session", "lock") => Ok(ScriptCommand::SessionLock),
            ("service", "register") => {
                Ok(ScriptCommand::ServiceRegister(uuid(first(args, "service uuid")?)?))
            }
            ("service", "unregister") => Ok(ScriptCommand::ServiceUnregister(uuid(first(
                args,
                "service uuid",
            )?)?)),
            ("client", "add") => args
                .iter()
                .map(|arg| parse_parameter(arg))
                .collect::<Result<_, _>>()
                .map(ScriptCommand::ClientAdd),
            ("client", "result") => Ok(ScriptCommand::ClientResult(Self::client_number(args)?)),
            ("client", "remove") => Ok(ScriptCommand::ClientRemove(Self::client_number(args)?)),
            ("client", "list") => Ok(ScriptCommand::ClientList),
            ("interfaces", "bump") => Ok(ScriptCommand::InterfacesBump),
            (group, verb) => Err(ScriptCommandError::UnknownCommand(format!(
                "{} {}",
                group, verb
            ))),
        }
    }

    fn parse_policy_add(args: &[&str]) -> Result<ScriptCommand, ScriptCommandError> {
        let order = number(first(args, "order")?)?;
        let result = parse_result(
            args.get(1)
                .ok_or_else(|| ScriptCommandError::MissingArgument("result".to_string()))?,
        )?;
        let conditions = args
            .iter()
            .skip(2)
            .map(|arg| parse_condition(arg))
            .collect::<Result<_, _>>()?;
        Ok(ScriptCommand::PolicyAdd {
            order,
            conditions,
            result,
        })
    }

    fn policy_id(args: &[&str]) -> Result<PolicyId, ScriptCommandError> {
        Ok(PolicyId::new(number(first(args, "policy id")?)?))
    }

    fn client_number(args: &[&str]) -> Result<usize, ScriptCommandError> {
        match number(first(args, "client number")?)? {
            0 => Err(invalid("clients are numbered from 1")),
            n => Ok(n),
        }
    }
}

fn invalid(message: impl Into<String>) -> ScriptCommandError {
    ScriptCommandError::InvalidArgument(message.into())
}

fn first<'a>(args: &[&'a str], what: &str) -> Result<&'a str, ScriptCommandError> {
    args.first()
        .copied()
        .ok_or_else(|| ScriptCommandError::MissingArgument(what.to_string()))
}

fn number<T: FromStr>(text: &str) -> Result<T, ScriptCommandError> {
    text.parse()
        .map_err(|_| invalid(format!("not a number: {}", text)))
}

fn uuid(text: &str) -> Result<Uuid, ScriptCommandError> {
    Uuid::parse_str(text).map_err(|_| invalid(format!("not a uuid: {}", text)))
}

/// `10.0.0.1:443`, `[fe80::1]:80`, or a bare address with port 0
fn address(text: &str) -> Result<SocketAddr, ScriptCommandError> {
    text.parse::<SocketAddr>()
        .or_else(|_| text.parse::<IpAddr>().map(|ip| SocketAddr::new(ip, 0)))
        .map_err(|_| invalid(format!("not an address: {}", text)))
}

fn prefix(text: &str) -> Result<AddressPrefix, ScriptCommandError> {
    match text.rsplit_once('/') {
        Some((addr, bits)) => Ok(AddressPrefix::new(address(addr)?, number(bits)?)),
        None => {
            let addr = address(text)?;
            let bits = if addr.is_ipv4() { 32 } else { 128 };
            Ok(AddressPrefix::new(addr, bits))
        }
    }
}

fn range(text: &str) -> Result<AddressRange, ScriptCommandError> {
    let (start, end) = text
        .split_once("..")
        .ok_or_else(|| invalid(format!("expected start..end: {}", text)))?;
    Ok(AddressRange::new(address(start)?, address(end)?))
}

fn functional_type(text: &str) -> Result<FunctionalType, ScriptCommandError> {
    match text {
        "loopback" => Ok(FunctionalType::Loopback),
        "wired" => Ok(FunctionalType::Wired),
        "wifi" => Ok(FunctionalType::WifiInfra),
        "awdl" => Ok(FunctionalType::WifiAwdl),
        "cellular" => Ok(FunctionalType::Cellular),
        other => Err(invalid(format!("unknown interface type: {}", other))),
    }
}

/// `domain/type`, either part may be empty
fn agent_type(text: &str) -> Result<AgentType, ScriptCommandError> {
    let (domain, kind) = text
        .split_once('/')
        .ok_or_else(|| invalid(format!("expected domain/type: {}", text)))?;
    Ok(AgentType::new(domain, kind))
}

fn key_value(token: &str) -> (&str, Option<&str>) {
    match token.split_once('=') {
        Some((key, value)) => (key, Some(value)),
        None => (token, None),
    }
}

fn parse_result(token: &str) -> Result<PolicyResult, ScriptCommandError> {
    let result = match key_value(token) {
        ("pass", None) => PolicyResult::Pass,
        ("drop", None) => PolicyResult::Drop,
        ("ip-filter", None) => PolicyResult::IpFilter,
        ("skip", Some(order)) => PolicyResult::SkipToOrder(number(order)?),
        ("divert", Some(unit)) => PolicyResult::SocketDivert(number(unit)?),
        ("filter", Some(unit)) => PolicyResult::SocketFilter(number(unit)?),
        ("tunnel", Some(name)) => PolicyResult::IpTunnel(name.to_string()),
        ("scoped", Some(name)) => PolicyResult::SocketScoped(name.to_string()),
        ("trigger", Some(service)) => PolicyResult::Trigger(uuid(service)?),
        ("trigger-if-needed", Some(service)) => PolicyResult::TriggerIfNeeded(uuid(service)?),
        ("trigger-scoped", Some(service)) => PolicyResult::TriggerScoped(uuid(service)?),
        ("no-trigger-scoped", Some(service)) => PolicyResult::NoTriggerScoped(uuid(service)?),
        ("use-agent", Some(agent)) => PolicyResult::UseNetAgent(uuid(agent)?),
        ("route-rules", Some(rules)) => PolicyResult::RouteRules(
            rules
                .split(',')
                .map(parse_route_rule)
                .collect::<Result<_, _>>()?,
        ),
        _ => return Err(invalid(format!("unknown result: {}", token))),
    };
    Ok(result)
}

/// `deny`, `deny:en0` or `allow:wifi+expensive`
fn parse_route_rule(text: &str) -> Result<RouteRule, ScriptCommandError> {
    let (action, target) = match text.split_once(':') {
        Some((action, target)) => (action, Some(target)),
        None => (text, None),
    };
    let action = match action {
        "deny" => RouteRuleAction::Deny,
        "allow" => RouteRuleAction::Allow,
        "qos" => RouteRuleAction::QosMarking,
        other => return Err(invalid(format!("unknown route rule action: {}", other))),
    };
    let rule = RouteRule::new(action);
    let Some(target) = target else {
        return Ok(rule);
    };
    Ok(match flag_words(target) {
        Some(flags) => rule.with_flags(flags),
        None => rule.with_interface(target),
    })
}

/// Union of `+`-joined flag words, or None if any word is not a flag
fn flag_words(text: &str) -> Option<RouteRuleFlags> {
    text.split('+')
        .try_fold(RouteRuleFlags::empty(), |flags, word| {
            let flag = match word {
                "cellular" => RouteRuleFlags::CELLULAR,
                "wifi" => RouteRuleFlags::WIFI,
                "wired" => RouteRuleFlags::WIRED,
                "expensive" => RouteRuleFlags::EXPENSIVE,
                _ => return None,
            };
            Some(flags | flag)
        })
}

fn parse_condition(token: &str) -> Result<PolicyCondition, ScriptCommandError> {
    let (negated, token) = match token.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let condition = match key_value(token) {
        ("default", None) => Condition::Default,
        ("all-interfaces", None) => Condition::AllInterfaces,
        ("app", Some(id)) => Condition::Application(uuid(id)?),
        ("real-app", Some(id)) => Condition::RealApplication(uuid(id)?),
        ("domain", Some(domain)) => Condition::Domain(domain.to_string()),
        ("account", Some(account)) => Condition::Account(account.to_string()),
        ("entitlement", Some(name)) => Condition::Entitlement(name.to_string()),
        ("pid", Some(pid)) => Condition::Pid(number(pid)?),
        ("uid", Some(uid)) => Condition::Uid(number(uid)?),
        ("bound-if", Some(name)) => Condition::BoundInterface(name.to_string()),
        ("traffic-class", Some(span)) => {
            let (start, end) = span
                .split_once('-')
                .ok_or_else(|| invalid(format!("expected start-end: {}", span)))?;
            Condition::TrafficClassRange {
                start: number(start)?,
                end: number(end)?,
            }
        }
        ("protocol", Some(protocol)) => Condition::IpProtocol(number(protocol)?),
        ("local", Some(addr)) => Condition::LocalAddr(prefix(addr)?),
        ("remote", Some(addr)) => Condition::RemoteAddr(prefix(addr)?),
        ("local-range", Some(span)) => Condition::LocalAddrRange(range(span)?),
        ("remote-range", Some(span)) => Condition::RemoteAddrRange(range(span)?),
        _ => return Err(invalid(format!("unknown condition: {}", token))),
    };
    Ok(if negated {
        PolicyCondition::negated(condition)
    } else {
        PolicyCondition::new(condition)
    })
}

fn parse_parameter(token: &str) -> Result<ClientParameter, ScriptCommandError> {
    let (key, value) = key_value(token);
    let value = value.ok_or_else(|| invalid(format!("expected key=value: {}", token)))?;
    let parameter = match key {
        "app" => ClientParameter::Application(uuid(value)?),
        "real-app" => ClientParameter::RealApplication(uuid(value)?),
        "domain" => ClientParameter::Domain(value.to_string()),
        "account" => ClientParameter::Account(value.to_string()),
        "pid" => ClientParameter::Pid(number(value)?),
        "uid" => ClientParameter::Uid(number(value)?),
        "bound-if" => ClientParameter::BoundInterface(value.to_string()),
        "traffic-class" => ClientParameter::TrafficClass(number(value)?),
        "protocol" => ClientParameter::IpProtocol(number(value)?),
        "local" => ClientParameter::LocalAddress(address(value)?),
        "remote" => ClientParameter::RemoteAddress(address(value)?),
        "prohibit-if" => ClientParameter::ProhibitInterface(value.to_string()),
        "prohibit-type" => ClientParameter::ProhibitInterfaceType(functional_type(value)?),
        "require-type" => ClientParameter::RequireInterfaceType(functional_type(value)?),
        "prohibit-agent" => ClientParameter::ProhibitAgent(uuid(value)?),
        "require-agent" => ClientParameter::RequireAgent(uuid(value)?),
        "prefer-agent" => ClientParameter::PreferAgent(uuid(value)?),
        "prohibit-agent-type" => ClientParameter::ProhibitAgentType(agent_type(value)?),
        "require-agent-type" => ClientParameter::RequireAgentType(agent_type(value)?),
        "prefer-agent-type" => ClientParameter::PreferAgentType(agent_type(value)?),
        other => return Err(invalid(format!("unknown client parameter: {}", other))),
    };
    Ok(parameter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy_add() {
        let cmd = ScriptCommandParser::parse("policy add 10 drop domain=apple.com !pid=7").unwrap();
        assert_eq!(
            cmd,
            ScriptCommand::PolicyAdd {
                order: 10,
                conditions: vec![
                    PolicyCondition::new(Condition::Domain("apple.com".into())),
                    PolicyCondition::negated(Condition::Pid(7)),
                ],
                result: PolicyResult::Drop,
            }
        );
        assert!(matches!(
            cmd.to_command(),
            Some(Command::PolicyAdd { order: 10, .. })
        ));
    }

    #[test]
    fn test_parse_results() {
        let parse = |text: &str| parse_result(text).unwrap();
        assert_eq!(parse("skip=20"), PolicyResult::SkipToOrder(20));
        assert_eq!(parse("tunnel=utun0"), PolicyResult::IpTunnel("utun0".into()));
        assert_eq!(parse("filter=3"), PolicyResult::SocketFilter(3));
        assert_eq!(
            parse("route-rules=deny:cellular+expensive,allow:en0"),
            PolicyResult::RouteRules(vec![
                RouteRule::new(RouteRuleAction::Deny)
                    .with_flags(RouteRuleFlags::CELLULAR | RouteRuleFlags::EXPENSIVE),
                RouteRule::new(RouteRuleAction::Allow).with_interface("en0"),
            ])
        );
        assert!(parse_result("teleport").is_err());
        assert!(parse_result("skip").is_err());
    }

    #[test]
    fn test_parse_address_conditions() {
        let remote = parse_condition("remote=10.0.0.0/8").unwrap();
        assert_eq!(
            remote.condition,
            Condition::RemoteAddr(AddressPrefix::new("10.0.0.0:0".parse().unwrap(), 8))
        );
        let range = parse_condition("local-range=10.0.0.1..10.0.0.9").unwrap();
        assert!(matches!(range.condition, Condition::LocalAddrRange(_)));
        let tc = parse_condition("traffic-class=100-200").unwrap();
        assert_eq!(
            tc.condition,
            Condition::TrafficClassRange {
                start: 100,
                end: 200
            }
        );
    }

    #[test]
    fn test_parse_client_add() {
        let cmd = ScriptCommandParser::parse(
            "client add domain=www.apple.com remote=17.0.0.1:443 prohibit-type=cellular",
        )
        .unwrap();
        assert_eq!(
            cmd,
            ScriptCommand::ClientAdd(vec![
                ClientParameter::Domain("www.apple.com".into()),
                ClientParameter::RemoteAddress("17.0.0.1:443".parse().unwrap()),
                ClientParameter::ProhibitInterfaceType(FunctionalType::Cellular),
            ])
        );
        assert_eq!(cmd.to_command(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ScriptCommandParser::parse("   "),
            Err(ScriptCommandError::InvalidCommand(_))
        ));
        assert!(matches!(
            ScriptCommandParser::parse("policy"),
            Err(ScriptCommandError::MissingArgument(_))
        ));
        assert!(matches!(
            ScriptCommandParser::parse("policy get"),
            Err(ScriptCommandError::MissingArgument(_))
        ));
        assert!(matches!(
            ScriptCommandParser::parse("session priority 9"),
            Err(ScriptCommandError::InvalidArgument(_))
        ));
        assert!(matches!(
            ScriptCommandParser::parse("client result 0"),
            Err(ScriptCommandError::InvalidArgument(_))
        ));
        assert_eq!(
            ScriptCommandParser::parse("reboot now"),
            Err(ScriptCommandError::UnknownCommand("reboot now".into()))
        );
    }
}
