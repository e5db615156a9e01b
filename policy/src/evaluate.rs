//! Client evaluation
//!
//! Evaluation scans an applied snapshot for one client and builds its
//! [`AggregateResult`]. It never mutates the store and holds no locks; interface
//! and agent lookups go straight to the collaborators.

use core_types::{
    AgentType, AggregateResult, ClientParameter, ClientResultFlags, Condition, FunctionalType,
    NetAgentUse, Pid, PolicyCondition, PolicyResult, ResultKind, RouteRule, RouteRuleAction,
    RouteRuleFlags, RoutingParameter, Uid, SERVICE_FLAGS_REGISTERED,
};
use kernel_api::{Credentials, InterfaceDetails, InterfaceTable, NetworkAgents};
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

use crate::snapshot::PolicySnapshot;

/// The attributes of a flow client that conditions are matched against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientAttributes {
    pub application: Option<Uuid>,
    pub real_application: Option<Uuid>,
    pub domain: Option<String>,
    pub account: Option<String>,
    /// Entitlements held by the client's process
    pub entitlements: BTreeSet<String>,
    pub pid: Option<Pid>,
    pub uid: Option<Uid>,
    pub bound_interface: Option<String>,
    pub traffic_class: Option<u32>,
    pub ip_protocol: Option<u8>,
    pub local_address: Option<SocketAddr>,
    pub remote_address: Option<SocketAddr>,
    pub prohibit_interfaces: Vec<String>,
    pub prohibit_interface_types: Vec<FunctionalType>,
    pub prohibit_agents: Vec<Uuid>,
    pub prohibit_agent_types: Vec<AgentType>,
    pub require_interface_type: Option<FunctionalType>,
    pub require_agents: Vec<Uuid>,
    pub require_agent_types: Vec<AgentType>,
    pub prefer_agents: Vec<Uuid>,
    pub prefer_agent_types: Vec<AgentType>,
}

impl ClientAttributes {
    /// Collects attributes from a client's parameters.
    ///
    /// Explicit parameters win; the owning process's credentials fill in the
    /// application, pid and uid otherwise. A named remote endpoint supplies the
    /// domain and an address endpoint the remote address when those parameters
    /// are absent.
    pub fn from_parameters(parameters: &[ClientParameter], owner: Option<&Credentials>) -> Self {
        let mut attrs = Self::default();
        let mut local_endpoint = None;
        let mut remote_endpoint = None;

        for parameter in parameters {
            match parameter {
                ClientParameter::Application(uuid) => attrs.application = Some(*uuid),
                ClientParameter::RealApplication(uuid) => attrs.real_application = Some(*uuid),
                ClientParameter::Domain(domain) => attrs.domain = Some(domain.clone()),
                ClientParameter::Account(account) => attrs.account = Some(account.clone()),
                ClientParameter::Pid(pid) => attrs.pid = Some(*pid),
                ClientParameter::Uid(uid) => attrs.uid = Some(*uid),
                ClientParameter::BoundInterface(name) => {
                    attrs.bound_interface = Some(name.clone())
                }
                ClientParameter::TrafficClass(tc) => attrs.traffic_class = Some(*tc),
                ClientParameter::IpProtocol(proto) => attrs.ip_protocol = Some(*proto),
                ClientParameter::LocalAddress(addr) => attrs.local_address = Some(*addr),
                ClientParameter::RemoteAddress(addr) => attrs.remote_address = Some(*addr),
                ClientParameter::ProhibitInterface(name) => {
                    attrs.prohibit_interfaces.push(name.clone())
                }
                ClientParameter::ProhibitInterfaceType(ft) => {
                    attrs.prohibit_interface_types.push(*ft)
                }
                ClientParameter::ProhibitAgent(uuid) => attrs.prohibit_agents.push(*uuid),
                ClientParameter::ProhibitAgentType(t) => attrs.prohibit_agent_types.push(t.clone()),
                ClientParameter::RequireInterfaceType(ft) => {
                    attrs.require_interface_type = Some(*ft)
                }
                ClientParameter::RequireAgent(uuid) => attrs.require_agents.push(*uuid),
                ClientParameter::RequireAgentType(t) => attrs.require_agent_types.push(t.clone()),
                ClientParameter::PreferAgent(uuid) => attrs.prefer_agents.push(*uuid),
                ClientParameter::PreferAgentType(t) => attrs.prefer_agent_types.push(t.clone()),
                ClientParameter::LocalEndpoint(endpoint) => local_endpoint = Some(endpoint),
                ClientParameter::RemoteEndpoint(endpoint) => remote_endpoint = Some(endpoint),
                ClientParameter::TriggerAgent(_)
                | ClientParameter::AssertAgent(_)
                | ClientParameter::UnassertAgent(_) => {}
            }
        }

        if attrs.local_address.is_none() {
            attrs.local_address = local_endpoint.and_then(|e| e.address());
        }
        if let Some(endpoint) = remote_endpoint {
            if attrs.remote_address.is_none() {
                attrs.remote_address = endpoint.address();
            }
            if attrs.domain.is_none() {
                attrs.domain = endpoint.host_name().map(str::to_string);
            }
        }

        if let Some(creds) = owner {
            attrs.application.get_or_insert(creds.application);
            attrs.pid.get_or_insert(creds.pid);
            attrs.uid.get_or_insert(creds.uid);
            attrs.entitlements = creds.entitlements.clone();
        }
        if attrs.real_application.is_none() {
            attrs.real_application = attrs.application;
        }
        attrs
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_application(mut self, application: Uuid) -> Self {
        self.application = Some(application);
        self.real_application.get_or_insert(application);
        self
    }
}

/// Collaborators consulted during evaluation
#[derive(Clone, Copy)]
pub struct EvaluationEnv<'a> {
    pub interfaces: &'a dyn InterfaceTable,
    pub agents: &'a dyn NetworkAgents,
}

impl<'a> EvaluationEnv<'a> {
    pub fn new(interfaces: &'a dyn InterfaceTable, agents: &'a dyn NetworkAgents) -> Self {
        Self { interfaces, agents }
    }
}

/// Returns true if `condition` holds for `client`, honoring negation
pub fn condition_matches(condition: &PolicyCondition, client: &ClientAttributes) -> bool {
    base_matches(&condition.condition, client) != condition.is_negative()
}

fn base_matches(condition: &Condition, client: &ClientAttributes) -> bool {
    match condition {
        Condition::Default | Condition::AllInterfaces => true,
        Condition::Application(uuid) => client.application == Some(*uuid),
        Condition::RealApplication(uuid) => client.real_application == Some(*uuid),
        Condition::Domain(domain) => client
            .domain
            .as_deref()
            .is_some_and(|host| domain_matches(domain, host)),
        Condition::Account(account) => client.account.as_deref() == Some(account.as_str()),
        Condition::Entitlement(name) => client.entitlements.contains(name),
        Condition::Pid(pid) => client.pid == Some(*pid),
        Condition::Uid(uid) => client.uid == Some(*uid),
        Condition::BoundInterface(name) => {
            client.bound_interface.as_deref() == Some(name.as_str())
        }
        Condition::TrafficClassRange { start, end } => client
            .traffic_class
            .is_some_and(|tc| *start <= tc && tc <= *end),
        Condition::IpProtocol(proto) => client.ip_protocol == Some(*proto),
        Condition::LocalAddr(prefix) => client
            .local_address
            .is_some_and(|addr| prefix.contains(&addr)),
        Condition::RemoteAddr(prefix) => client
            .remote_address
            .is_some_and(|addr| prefix.contains(&addr)),
        Condition::LocalAddrRange(range) => client
            .local_address
            .is_some_and(|addr| range.contains(&addr)),
        Condition::RemoteAddrRange(range) => client
            .remote_address
            .is_some_and(|addr| range.contains(&addr)),
    }
}

/// Case-insensitive domain match: equal, or `host` is a subdomain of `domain`
pub fn domain_matches(domain: &str, host: &str) -> bool {
    let domain = domain.trim_end_matches('.');
    let host = host.trim_end_matches('.');
    if domain.is_empty() || host.len() < domain.len() {
        return false;
    }
    if host.eq_ignore_ascii_case(domain) {
        return true;
    }
    let split = host.len() - domain.len();
    host.is_char_boundary(split)
        && host[split..].eq_ignore_ascii_case(domain)
        && host[..split].ends_with('.')
}

/// Evaluates `client` against an applied snapshot
pub fn evaluate(
    snapshot: &PolicySnapshot,
    client: &ClientAttributes,
    env: &EvaluationEnv<'_>,
) -> AggregateResult {
    let mut aggregate = AggregateResult::pass();
    let mut decided: Option<&PolicyResult> = None;
    let mut skip = None;

    for applied in snapshot.policies() {
        if let Some((band, target)) = skip {
            if applied.priority == band && applied.policy.order < target {
                continue;
            }
            skip = None;
        }
        let policy = &applied.policy;
        if !policy.conditions.iter().all(|c| condition_matches(c, client)) {
            continue;
        }

        match &policy.result {
            PolicyResult::SkipToOrder(0) => {
                aggregate.routing_result = ResultKind::Pass;
                aggregate.policy_id = None;
                break;
            }
            PolicyResult::SkipToOrder(target) => {
                skip = Some((applied.priority, *target));
            }
            PolicyResult::SocketFilter(unit) => {
                if aggregate.filter_control_unit == 0 {
                    aggregate.filter_control_unit = *unit;
                }
            }
            PolicyResult::UseNetAgent(uuid) => {
                if !client.prohibit_agents.contains(uuid) {
                    aggregate.push_netagent(agent_use(env, *uuid));
                }
            }
            result if result.kind().is_trigger() => {
                if aggregate.service_action.is_none() {
                    aggregate.service_action = Some(result.kind());
                    aggregate.service_uuid = result.service_uuid();
                    if result
                        .service_uuid()
                        .is_some_and(|uuid| snapshot.is_service_registered(&uuid))
                    {
                        aggregate.service_flags |= SERVICE_FLAGS_REGISTERED;
                    }
                }
            }
            result => {
                aggregate.routing_result = result.kind();
                aggregate.policy_id = Some(policy.id);
                decided = Some(result);
                break;
            }
        }
    }

    route(&mut aggregate, decided, client, env);
    aggregate
}

fn agent_use(env: &EvaluationEnv<'_>, uuid: Uuid) -> NetAgentUse {
    match env.agents.agent(uuid) {
        Some(info) => NetAgentUse {
            uuid,
            generation: info.generation,
            flags: info.flags.bits(),
        },
        None => NetAgentUse {
            uuid,
            generation: 0,
            flags: 0,
        },
    }
}

/// Resolves the routed interface and applies route rules and path flags
fn route(
    aggregate: &mut AggregateResult,
    decided: Option<&PolicyResult>,
    client: &ClientAttributes,
    env: &EvaluationEnv<'_>,
) {
    let interface = match decided {
        Some(PolicyResult::Drop) => None,
        Some(PolicyResult::IpTunnel(name)) | Some(PolicyResult::SocketScoped(name)) => {
            let interface = env.interfaces.by_name(name);
            aggregate.routing_parameter =
                RoutingParameter::InterfaceIndex(interface.as_ref().map_or(0, |i| i.index));
            interface
        }
        Some(PolicyResult::SocketDivert(unit)) => {
            aggregate.routing_parameter = RoutingParameter::ControlUnit(*unit);
            select_interface(client, env)
        }
        _ => select_interface(client, env),
    };

    if let (Some(PolicyResult::RouteRules(rules)), Some(iface)) = (decided, interface.as_ref()) {
        if apply_route_rules(aggregate, rules, iface) == Some(RouteRuleAction::Deny) {
            aggregate.routing_result = ResultKind::Drop;
            aggregate.routing_parameter = RoutingParameter::None;
            return;
        }
    }

    let Some(iface) = interface else {
        return;
    };
    aggregate.routed_interface_index = iface.index;
    if iface.has_ipv4 {
        aggregate.flags |= ClientResultFlags::HAS_IPV4;
    }
    if iface.has_ipv6 {
        aggregate.flags |= ClientResultFlags::HAS_IPV6;
    }
    if iface.functional_type == FunctionalType::Loopback {
        aggregate.flags |= ClientResultFlags::IS_LOCAL;
    }
    if client.remote_address.is_some_and(|addr| is_direct(&addr)) {
        aggregate.flags |= ClientResultFlags::IS_DIRECT;
    }
    for agent in &iface.agents {
        if !client.prohibit_agents.contains(agent) {
            aggregate.push_netagent(agent_use(env, *agent));
        }
    }
}

/// Applies rules in order, returning the Allow or Deny action that decided
fn apply_route_rules(
    aggregate: &mut AggregateResult,
    rules: &[RouteRule],
    iface: &InterfaceDetails,
) -> Option<RouteRuleAction> {
    for rule in rules.iter().filter(|rule| rule_selects(rule, iface)) {
        match rule.action {
            RouteRuleAction::QosMarking => aggregate.qos_marking = true,
            action => return Some(action),
        }
    }
    None
}

fn rule_selects(rule: &RouteRule, iface: &InterfaceDetails) -> bool {
    if !rule.interface_name.is_empty() {
        return rule.interface_name == iface.name;
    }
    if rule.flags.is_empty() {
        return true;
    }
    (rule.flags.contains(RouteRuleFlags::CELLULAR)
        && iface.functional_type == FunctionalType::Cellular)
        || (rule.flags.contains(RouteRuleFlags::WIFI) && iface.functional_type.is_wifi())
        || (rule.flags.contains(RouteRuleFlags::WIRED)
            && iface.functional_type == FunctionalType::Wired)
        || (rule.flags.contains(RouteRuleFlags::EXPENSIVE) && iface.is_expensive())
}

fn select_interface(
    client: &ClientAttributes,
    env: &EvaluationEnv<'_>,
) -> Option<InterfaceDetails> {
    if let Some(name) = &client.bound_interface {
        return env.interfaces.by_name(name);
    }

    let wants_loopback = client.remote_address.is_some_and(|addr| addr.ip().is_loopback());
    let candidates: Vec<InterfaceDetails> = env
        .interfaces
        .interfaces()
        .into_iter()
        .filter(|iface| (iface.functional_type == FunctionalType::Loopback) == wants_loopback)
        .filter(|iface| interface_allowed(client, iface, env))
        .collect();

    let preferred = candidates
        .iter()
        .position(|iface| interface_preferred(client, iface, env));
    match preferred {
        Some(position) => candidates.into_iter().nth(position),
        None => candidates.into_iter().next(),
    }
}

fn interface_allowed(
    client: &ClientAttributes,
    iface: &InterfaceDetails,
    env: &EvaluationEnv<'_>,
) -> bool {
    if client.prohibit_interfaces.iter().any(|name| *name == iface.name)
        || client.prohibit_interface_types.contains(&iface.functional_type)
    {
        return false;
    }
    if client
        .require_interface_type
        .is_some_and(|ft| ft != iface.functional_type)
    {
        return false;
    }
    if iface.agents.iter().any(|agent| client.prohibit_agents.contains(agent)) {
        return false;
    }
    if !client
        .require_agents
        .iter()
        .all(|agent| iface.agents.contains(agent))
    {
        return false;
    }
    if client.prohibit_agent_types.is_empty() && client.require_agent_types.is_empty() {
        return true;
    }

    let types = agent_types(iface, env);
    let prohibited = client
        .prohibit_agent_types
        .iter()
        .any(|wanted| types.iter().any(|(d, t)| wanted.matches(d, t)));
    let required = client
        .require_agent_types
        .iter()
        .all(|wanted| types.iter().any(|(d, t)| wanted.matches(d, t)));
    !prohibited && required
}

fn interface_preferred(
    client: &ClientAttributes,
    iface: &InterfaceDetails,
    env: &EvaluationEnv<'_>,
) -> bool {
    if iface.agents.iter().any(|agent| client.prefer_agents.contains(agent)) {
        return true;
    }
    if client.prefer_agent_types.is_empty() {
        return false;
    }
    let types = agent_types(iface, env);
    client
        .prefer_agent_types
        .iter()
        .any(|wanted| types.iter().any(|(d, t)| wanted.matches(d, t)))
}

fn agent_types(iface: &InterfaceDetails, env: &EvaluationEnv<'_>) -> Vec<(String, String)> {
    iface
        .agents
        .iter()
        .filter_map(|uuid| env.agents.agent(*uuid))
        .map(|info| (info.domain, info.agent_type))
        .collect()
}

fn is_direct(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::AppliedPolicy;
    use core_types::{AddressPrefix, Endpoint, Policy, PolicyId, SessionId, SessionPriority};
    use kernel_api::{InterfaceFlags, NetAgentInfo};
    use sim_kernel::{SimAgents, SimInterfaces};

    struct Fixture {
        interfaces: SimInterfaces,
        agents: SimAgents,
    }

    impl Fixture {
        fn new() -> Self {
            let interfaces = SimInterfaces::new();
            interfaces.add(InterfaceDetails::new("lo0", 1, FunctionalType::Loopback));
            interfaces.add(InterfaceDetails::new("en0", 4, FunctionalType::WifiInfra).with_ipv6(true));
            interfaces.add(
                InterfaceDetails::new("pdp_ip0", 6, FunctionalType::Cellular)
                    .with_flags(InterfaceFlags::EXPENSIVE),
            );
            Self {
                interfaces,
                agents: SimAgents::new(),
            }
        }

        fn env(&self) -> EvaluationEnv<'_> {
            EvaluationEnv::new(&self.interfaces, &self.agents)
        }
    }

    fn snapshot(policies: Vec<(u32, u32, Vec<PolicyCondition>, PolicyResult)>) -> PolicySnapshot {
        let owner = SessionId::new();
        let entries = policies
            .into_iter()
            .map(|(id, order, conditions, result)| AppliedPolicy {
                policy: Policy {
                    id: PolicyId::new(id),
                    order,
                    owner,
                    conditions,
                    result,
                },
                priority: SessionPriority::Default,
                session_order: 1,
                owner_name: "test".to_string(),
            });
        PolicySnapshot::empty().replace_session(owner, entries)
    }

    fn domain(d: &str) -> Vec<PolicyCondition> {
        vec![PolicyCondition::new(Condition::Domain(d.to_string()))]
    }

    fn default() -> Vec<PolicyCondition> {
        vec![PolicyCondition::new(Condition::Default)]
    }

    #[test]
    fn test_domain_matching() {
        assert!(domain_matches("apple.com", "apple.com"));
        assert!(domain_matches("apple.com", "WWW.Apple.COM"));
        assert!(domain_matches("apple.com.", "www.apple.com"));
        assert!(!domain_matches("apple.com", "pineapple.com"));
        assert!(!domain_matches("apple.com", "com"));
    }

    #[test]
    fn test_no_match_is_implicit_pass() {
        let fixture = Fixture::new();
        let snap = snapshot(vec![(1, 10, domain("apple.com"), PolicyResult::Drop)]);
        let client = ClientAttributes::default().with_domain("example.org");
        let result = evaluate(&snap, &client, &fixture.env());
        assert_eq!(result.routing_result, ResultKind::Pass);
        assert_eq!(result.policy_id, None);
    }

    #[test]
    fn test_lower_order_wins() {
        let fixture = Fixture::new();
        let snap = snapshot(vec![
            (1, 10, domain("apple.com"), PolicyResult::Drop),
            (2, 5, default(), PolicyResult::Pass),
        ]);
        let client = ClientAttributes::default().with_domain("apple.com");
        let result = evaluate(&snap, &client, &fixture.env());
        assert_eq!(result.routing_result, ResultKind::Pass);
        assert_eq!(result.policy_id, Some(PolicyId::new(2)));
    }

    #[test]
    fn test_skip_to_order_zero_passes() {
        let fixture = Fixture::new();
        let snap = snapshot(vec![
            (1, 1, default(), PolicyResult::SkipToOrder(0)),
            (2, 2, default(), PolicyResult::Drop),
        ]);
        let result = evaluate(&snap, &ClientAttributes::default(), &fixture.env());
        assert_eq!(result.routing_result, ResultKind::Pass);
        // Implicit pass, same as no match
        assert_eq!(result.policy_id, None);
    }

    #[test]
    fn test_skip_to_order_jumps() {
        let fixture = Fixture::new();
        let snap = snapshot(vec![
            (1, 1, default(), PolicyResult::SkipToOrder(50)),
            (2, 20, default(), PolicyResult::Drop),
            (3, 50, default(), PolicyResult::IpFilter),
        ]);
        let result = evaluate(&snap, &ClientAttributes::default(), &fixture.env());
        assert_eq!(result.routing_result, ResultKind::IpFilter);
        assert_eq!(result.policy_id, Some(PolicyId::new(3)));
    }

    #[test]
    fn test_negation_inverts_match() {
        let client = ClientAttributes::default().with_domain("apple.com");
        let positive = PolicyCondition::new(Condition::Domain("apple.com".into()));
        let negative = PolicyCondition::negated(Condition::Domain("apple.com".into()));
        assert!(condition_matches(&positive, &client));
        assert!(!condition_matches(&negative, &client));

        let other = ClientAttributes::default().with_domain("example.org");
        assert!(!condition_matches(&positive, &other));
        assert!(condition_matches(&negative, &other));
    }

    #[test]
    fn test_absent_attribute_does_not_match() {
        let client = ClientAttributes::default();
        assert!(!condition_matches(&PolicyCondition::new(Condition::Uid(0)), &client));
        assert!(condition_matches(&PolicyCondition::negated(Condition::Uid(0)), &client));
    }

    #[test]
    fn test_non_terminal_results_accumulate() {
        let fixture = Fixture::new();
        let service = Uuid::new_v4();
        let agent = Uuid::new_v4();
        fixture
            .agents
            .add(NetAgentInfo::new(agent, "com.example", "VPN"));
        let snap = snapshot(vec![
            (1, 1, default(), PolicyResult::SocketFilter(7)),
            (2, 2, default(), PolicyResult::SocketFilter(9)),
            (3, 3, default(), PolicyResult::Trigger(service)),
            (4, 4, default(), PolicyResult::UseNetAgent(agent)),
            (5, 5, default(), PolicyResult::Drop),
        ])
        .with_services([service].into_iter().collect());
        let result = evaluate(&snap, &ClientAttributes::default(), &fixture.env());
        assert_eq!(result.routing_result, ResultKind::Drop);
        assert_eq!(result.filter_control_unit, 7);
        assert_eq!(result.service_action, Some(ResultKind::Trigger));
        assert_eq!(result.service_uuid, Some(service));
        assert_eq!(result.service_flags, SERVICE_FLAGS_REGISTERED);
        assert_eq!(result.netagents.len(), 1);
        assert_eq!(result.netagents[0].generation, 1);
        assert_eq!(result.routed_interface_index, 0);
    }

    #[test]
    fn test_unregistered_service_has_no_flag() {
        let fixture = Fixture::new();
        let snap = snapshot(vec![(1, 1, default(), PolicyResult::TriggerIfNeeded(Uuid::new_v4()))]);
        let result = evaluate(&snap, &ClientAttributes::default(), &fixture.env());
        assert_eq!(result.service_flags, 0);
        assert_eq!(result.service_action, Some(ResultKind::TriggerIfNeeded));
    }

    #[test]
    fn test_tunnel_reports_interface_index() {
        let fixture = Fixture::new();
        fixture
            .interfaces
            .add(InterfaceDetails::new("utun0", 9, FunctionalType::Unknown));
        let snap = snapshot(vec![
            (1, 1, default(), PolicyResult::IpTunnel("utun0".into())),
            (2, 2, default(), PolicyResult::SocketScoped("missing0".into())),
        ]);
        let result = evaluate(&snap, &ClientAttributes::default(), &fixture.env());
        assert_eq!(result.routing_parameter, RoutingParameter::InterfaceIndex(9));
        assert_eq!(result.routed_interface_index, 9);
    }

    #[test]
    fn test_route_rules_deny_cellular() {
        let fixture = Fixture::new();
        let rules = vec![
            RouteRule::new(RouteRuleAction::QosMarking),
            RouteRule::new(RouteRuleAction::Deny).with_flags(RouteRuleFlags::CELLULAR),
        ];
        let snap = snapshot(vec![(1, 1, default(), PolicyResult::RouteRules(rules))]);

        let mut cellular = ClientAttributes::default();
        cellular.require_interface_type = Some(FunctionalType::Cellular);
        let result = evaluate(&snap, &cellular, &fixture.env());
        assert!(result.is_drop());
        assert_eq!(result.routed_interface_index, 0);

        let wifi = ClientAttributes::default();
        let result = evaluate(&snap, &wifi, &fixture.env());
        assert_eq!(result.routing_result, ResultKind::RouteRules);
        assert_eq!(result.routed_interface_index, 4);
        assert!(result.qos_marking);
        assert!(result.flags.contains(ClientResultFlags::HAS_IPV6));
    }

    #[test]
    fn test_route_rule_allow_stops() {
        let fixture = Fixture::new();
        let rules = vec![
            RouteRule::new(RouteRuleAction::Allow).with_interface("en0"),
            RouteRule::new(RouteRuleAction::Deny),
        ];
        let snap = snapshot(vec![(1, 1, default(), PolicyResult::RouteRules(rules))]);
        let result = evaluate(&snap, &ClientAttributes::default(), &fixture.env());
        assert!(!result.is_drop());
    }

    #[test]
    fn test_loopback_flags() {
        let fixture = Fixture::new();
        let snap = snapshot(Vec::new());
        let mut client = ClientAttributes::default();
        client.remote_address = Some("127.0.0.1:80".parse().unwrap());
        let result = evaluate(&snap, &client, &fixture.env());
        assert_eq!(result.routed_interface_index, 1);
        assert!(result.flags.contains(ClientResultFlags::IS_LOCAL));
        assert!(result.flags.contains(ClientResultFlags::IS_DIRECT));
    }

    #[test]
    fn test_prohibited_interface_skipped() {
        let fixture = Fixture::new();
        let mut client = ClientAttributes::default();
        client.prohibit_interface_types.push(FunctionalType::WifiInfra);
        let result = evaluate(&snapshot(Vec::new()), &client, &fixture.env());
        assert_eq!(result.routed_interface_index, 6);
    }

    #[test]
    fn test_preferred_agent_interface() {
        let fixture = Fixture::new();
        let agent = Uuid::new_v4();
        fixture
            .agents
            .add(NetAgentInfo::new(agent, "com.example", "Relay"));
        fixture.interfaces.add(
            InterfaceDetails::new("en1", 5, FunctionalType::Wired).with_agent(agent),
        );
        let mut client = ClientAttributes::default();
        client.prefer_agent_types.push(AgentType::new("", "Relay"));
        let result = evaluate(&snapshot(Vec::new()), &client, &fixture.env());
        assert_eq!(result.routed_interface_index, 5);
        assert_eq!(result.netagents.len(), 1);
        assert_eq!(result.netagents[0].uuid, agent);
    }

    #[test]
    fn test_attributes_from_parameters() {
        let app = Uuid::new_v4();
        let creds = Credentials::new(42, 501, app).with_entitlement("com.example.vpn");
        let params = vec![
            ClientParameter::RemoteEndpoint(Endpoint::Name {
                name: "www.apple.com".into(),
                port: 443,
                endpoint_type: 0,
            }),
            ClientParameter::Uid(0),
        ];
        let attrs = ClientAttributes::from_parameters(&params, Some(&creds));
        assert_eq!(attrs.domain.as_deref(), Some("www.apple.com"));
        assert_eq!(attrs.uid, Some(0));
        assert_eq!(attrs.pid, Some(42));
        assert_eq!(attrs.application, Some(app));
        assert_eq!(attrs.real_application, Some(app));
        assert!(attrs.entitlements.contains("com.example.vpn"));
    }

    #[test]
    fn test_remote_address_prefix() {
        let fixture = Fixture::new();
        let prefix = AddressPrefix::new("17.0.0.0:0".parse().unwrap(), 8);
        let snap = snapshot(vec![(
            1,
            1,
            vec![PolicyCondition::new(Condition::RemoteAddr(prefix))],
            PolicyResult::Drop,
        )]);
        let mut client = ClientAttributes::default();
        client.remote_address = Some("17.253.144.10:443".parse().unwrap());
        assert!(evaluate(&snap, &client, &fixture.env()).is_drop());
        client.remote_address = Some("18.0.0.1:443".parse().unwrap());
        assert!(!evaluate(&snap, &client, &fixture.env()).is_drop());
    }
}
