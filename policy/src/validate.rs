//! Structural checks applied before a policy enters the store

use core_types::{Condition, NecpError, PolicyCondition, PolicyResult};
use std::net::SocketAddr;

/// Longest interface name the kernel accepts, excluding the terminator
pub const MAX_INTERFACE_NAME_LEN: usize = 23;

/// Checks a condition set and result for a new policy
pub fn validate_policy(
    conditions: &[PolicyCondition],
    result: &PolicyResult,
) -> Result<(), NecpError> {
    validate_result(result)?;
    validate_conditions(conditions)
}

pub fn validate_result(result: &PolicyResult) -> Result<(), NecpError> {
    match result {
        PolicyResult::RouteRules(rules) => {
            if rules.is_empty() {
                return Err(NecpError::PolicyResultInvalid);
            }
            if rules
                .iter()
                .any(|rule| rule.interface_name.len() > MAX_INTERFACE_NAME_LEN)
            {
                return Err(NecpError::RouteRulesInvalid);
            }
            Ok(())
        }
        PolicyResult::IpTunnel(name) | PolicyResult::SocketScoped(name) => {
            if name.is_empty() || name.len() > MAX_INTERFACE_NAME_LEN {
                return Err(NecpError::PolicyResultInvalid);
            }
            Ok(())
        }
        PolicyResult::SocketDivert(0) | PolicyResult::SocketFilter(0) => {
            Err(NecpError::PolicyResultInvalid)
        }
        _ => Ok(()),
    }
}

pub fn validate_conditions(conditions: &[PolicyCondition]) -> Result<(), NecpError> {
    let has_default = conditions.iter().any(|c| c.condition.is_default());
    if has_default && conditions.len() > 1 {
        return Err(NecpError::PolicyConditionsInvalid);
    }

    let has_application = conditions
        .iter()
        .any(|c| matches!(c.condition, Condition::Application(_)));
    let has_real_application = conditions
        .iter()
        .any(|c| matches!(c.condition, Condition::RealApplication(_)));
    if has_real_application && !has_application {
        return Err(NecpError::PolicyConditionsInvalid);
    }

    for condition in conditions {
        if !condition_is_well_formed(&condition.condition) {
            return Err(NecpError::PolicyConditionsInvalid);
        }
    }
    Ok(())
}

fn condition_is_well_formed(condition: &Condition) -> bool {
    match condition {
        Condition::Domain(s) | Condition::Account(s) | Condition::Entitlement(s) => !s.is_empty(),
        Condition::BoundInterface(name) => {
            !name.is_empty() && name.len() <= MAX_INTERFACE_NAME_LEN
        }
        Condition::TrafficClassRange { start, end } => start <= end,
        Condition::LocalAddr(prefix) | Condition::RemoteAddr(prefix) => {
            prefix.prefix <= max_prefix(&prefix.address)
        }
        Condition::LocalAddrRange(range) | Condition::RemoteAddrRange(range) => {
            match (range.start, range.end) {
                (SocketAddr::V4(start), SocketAddr::V4(end)) => {
                    start.ip().octets() <= end.ip().octets()
                }
                (SocketAddr::V6(start), SocketAddr::V6(end)) => {
                    start.ip().octets() <= end.ip().octets()
                }
                _ => false,
            }
        }
        _ => true,
    }
}

fn max_prefix(addr: &SocketAddr) -> u8 {
    match addr {
        SocketAddr::V4(_) => 32,
        SocketAddr::V6(_) => 128,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{AddressPrefix, AddressRange, RouteRule, RouteRuleAction};
    use uuid::Uuid;

    fn cond(condition: Condition) -> PolicyCondition {
        PolicyCondition::new(condition)
    }

    #[test]
    fn test_default_is_exclusive() {
        let conditions = vec![
            cond(Condition::Default),
            cond(Condition::Domain("apple.com".into())),
        ];
        assert_eq!(
            validate_conditions(&conditions),
            Err(NecpError::PolicyConditionsInvalid)
        );
        assert!(validate_conditions(&[cond(Condition::Default)]).is_ok());
    }

    #[test]
    fn test_real_application_requires_application() {
        let real = cond(Condition::RealApplication(Uuid::new_v4()));
        assert_eq!(
            validate_conditions(&[real.clone()]),
            Err(NecpError::PolicyConditionsInvalid)
        );
        let app = cond(Condition::Application(Uuid::new_v4()));
        assert!(validate_conditions(&[app, real]).is_ok());
    }

    #[test]
    fn test_empty_route_rules() {
        assert_eq!(
            validate_result(&PolicyResult::RouteRules(vec![])),
            Err(NecpError::PolicyResultInvalid)
        );
        let long_name = "x".repeat(40);
        assert_eq!(
            validate_result(&PolicyResult::RouteRules(vec![
                RouteRule::new(RouteRuleAction::Deny).with_interface(long_name)
            ])),
            Err(NecpError::RouteRulesInvalid)
        );
    }

    #[test]
    fn test_malformed_conditions() {
        assert!(validate_conditions(&[cond(Condition::Domain(String::new()))]).is_err());
        assert!(validate_conditions(&[cond(Condition::TrafficClassRange {
            start: 5,
            end: 1
        })])
        .is_err());
        let prefix = AddressPrefix::new("10.0.0.0:0".parse().unwrap(), 33);
        assert!(validate_conditions(&[cond(Condition::LocalAddr(prefix))]).is_err());
        let mixed = AddressRange::new("10.0.0.1:0".parse().unwrap(), "[::1]:0".parse().unwrap());
        assert!(validate_conditions(&[cond(Condition::RemoteAddrRange(mixed))]).is_err());
    }

    #[test]
    fn test_tunnel_needs_interface() {
        assert_eq!(
            validate_result(&PolicyResult::IpTunnel(String::new())),
            Err(NecpError::PolicyResultInvalid)
        );
        assert!(validate_result(&PolicyResult::IpTunnel("utun0".into())).is_ok());
    }
}
