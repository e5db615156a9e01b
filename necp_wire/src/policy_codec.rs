//! Condition, result and route rule values
//!
//! These are the values carried inside CONDITION, RESULT and ROUTE_RULE TLVs. A
//! `RouteRules` result is encoded as a bare result code; its rules travel as
//! separate ROUTE_RULE TLVs next to it.

use crate::sockaddr::{put_sockaddr, read_sockaddr};
use crate::tlv::{
    decode_string, find, find_all, Reader, Tlv, TLV_CONDITION, TLV_ORDER, TLV_RESULT,
    TLV_ROUTE_RULE,
};
use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use core_types::{
    AddressPrefix, AddressRange, Condition, ConditionFlags, PolicyCondition, PolicyOrder,
    PolicyResult, ResultKind, RouteRule, RouteRuleAction, RouteRuleFlags,
};
use uuid::Uuid;

pub fn encode_condition(condition: &PolicyCondition) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(condition.condition.code());
    buf.put_u8(condition.flags.bits());
    match &condition.condition {
        Condition::Default | Condition::AllInterfaces => {}
        Condition::Application(uuid) | Condition::RealApplication(uuid) => {
            buf.put_slice(uuid.as_bytes())
        }
        Condition::Domain(s)
        | Condition::Account(s)
        | Condition::Entitlement(s)
        | Condition::BoundInterface(s) => buf.put_slice(s.as_bytes()),
        Condition::Pid(pid) => buf.put_i32_le(*pid),
        Condition::Uid(uid) => buf.put_u32_le(*uid),
        Condition::TrafficClassRange { start, end } => {
            buf.put_u32_le(*start);
            buf.put_u32_le(*end);
        }
        Condition::IpProtocol(proto) => buf.put_u8(*proto),
        Condition::LocalAddr(prefix) | Condition::RemoteAddr(prefix) => {
            buf.put_u8(prefix.prefix);
            put_sockaddr(&mut buf, &prefix.address);
        }
        Condition::LocalAddrRange(range) | Condition::RemoteAddrRange(range) => {
            put_sockaddr(&mut buf, &range.start);
            put_sockaddr(&mut buf, &range.end);
        }
    }
    buf.freeze()
}

pub fn decode_condition(value: &[u8]) -> Result<PolicyCondition, WireError> {
    let mut reader = Reader::new(value);
    let code = reader.u8()?;
    let flags = ConditionFlags::from_bits_truncate(reader.u8()?);
    let condition = match code {
        Condition::CODE_DEFAULT => Condition::Default,
        Condition::CODE_ALL_INTERFACES => Condition::AllInterfaces,
        Condition::CODE_APPLICATION => Condition::Application(exact_uuid(&mut reader)?),
        Condition::CODE_REAL_APPLICATION => {
            Condition::RealApplication(exact_uuid(&mut reader)?)
        }
        Condition::CODE_DOMAIN => Condition::Domain(decode_string(reader.rest())?),
        Condition::CODE_ACCOUNT => Condition::Account(decode_string(reader.rest())?),
        Condition::CODE_ENTITLEMENT => Condition::Entitlement(decode_string(reader.rest())?),
        Condition::CODE_BOUND_INTERFACE => {
            Condition::BoundInterface(decode_string(reader.rest())?)
        }
        Condition::CODE_PID => {
            expect_len(&reader, TLV_CONDITION, 4)?;
            Condition::Pid(reader.i32_le()?)
        }
        Condition::CODE_UID => {
            expect_len(&reader, TLV_CONDITION, 4)?;
            Condition::Uid(reader.u32_le()?)
        }
        Condition::CODE_TRAFFIC_CLASS => {
            expect_len(&reader, TLV_CONDITION, 8)?;
            Condition::TrafficClassRange {
                start: reader.u32_le()?,
                end: reader.u32_le()?,
            }
        }
        Condition::CODE_IP_PROTOCOL => {
            expect_len(&reader, TLV_CONDITION, 1)?;
            Condition::IpProtocol(reader.u8()?)
        }
        Condition::CODE_LOCAL_ADDR | Condition::CODE_REMOTE_ADDR => {
            let prefix = reader.u8()?;
            let address = read_sockaddr(&mut reader)?;
            expect_end(&reader, TLV_CONDITION)?;
            let prefix = AddressPrefix::new(address, prefix);
            if code == Condition::CODE_LOCAL_ADDR {
                Condition::LocalAddr(prefix)
            } else {
                Condition::RemoteAddr(prefix)
            }
        }
        Condition::CODE_LOCAL_ADDR_RANGE | Condition::CODE_REMOTE_ADDR_RANGE => {
            let start = read_sockaddr(&mut reader)?;
            let end = read_sockaddr(&mut reader)?;
            expect_end(&reader, TLV_CONDITION)?;
            let range = AddressRange::new(start, end);
            if code == Condition::CODE_LOCAL_ADDR_RANGE {
                Condition::LocalAddrRange(range)
            } else {
                Condition::RemoteAddrRange(range)
            }
        }
        other => return Err(WireError::UnknownCondition(other)),
    };
    Ok(PolicyCondition { condition, flags })
}

/// Encodes a result value. Route rules are not included.
pub fn encode_result(result: &PolicyResult) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(result.kind().code());
    match result {
        PolicyResult::Pass
        | PolicyResult::Drop
        | PolicyResult::IpFilter
        | PolicyResult::RouteRules(_) => {}
        PolicyResult::SkipToOrder(value)
        | PolicyResult::SocketDivert(value)
        | PolicyResult::SocketFilter(value) => buf.put_u32_le(*value),
        PolicyResult::IpTunnel(name) | PolicyResult::SocketScoped(name) => {
            buf.put_slice(name.as_bytes())
        }
        PolicyResult::Trigger(uuid)
        | PolicyResult::TriggerIfNeeded(uuid)
        | PolicyResult::TriggerScoped(uuid)
        | PolicyResult::NoTriggerScoped(uuid)
        | PolicyResult::UseNetAgent(uuid) => buf.put_slice(uuid.as_bytes()),
    }
    buf.freeze()
}

/// Decodes a result value. A `RouteRules` result comes back with no rules.
pub fn decode_result(value: &[u8]) -> Result<PolicyResult, WireError> {
    let mut reader = Reader::new(value);
    if reader.is_empty() {
        return Err(WireError::invalid(TLV_RESULT, "empty result"));
    }
    let code = reader.u8()?;
    let kind = ResultKind::from_code(code).ok_or(WireError::UnknownResult(code))?;
    let result = match kind {
        ResultKind::Pass => PolicyResult::Pass,
        ResultKind::Drop => PolicyResult::Drop,
        ResultKind::IpFilter => PolicyResult::IpFilter,
        ResultKind::RouteRules => PolicyResult::RouteRules(Vec::new()),
        ResultKind::SkipToOrder => PolicyResult::SkipToOrder(exact_u32(&mut reader)?),
        ResultKind::SocketDivert => PolicyResult::SocketDivert(exact_u32(&mut reader)?),
        ResultKind::SocketFilter => PolicyResult::SocketFilter(exact_u32(&mut reader)?),
        ResultKind::IpTunnel => PolicyResult::IpTunnel(decode_string(reader.rest())?),
        ResultKind::SocketScoped => PolicyResult::SocketScoped(decode_string(reader.rest())?),
        ResultKind::Trigger => PolicyResult::Trigger(exact_uuid_result(&mut reader)?),
        ResultKind::TriggerIfNeeded => {
            PolicyResult::TriggerIfNeeded(exact_uuid_result(&mut reader)?)
        }
        ResultKind::TriggerScoped => PolicyResult::TriggerScoped(exact_uuid_result(&mut reader)?),
        ResultKind::NoTriggerScoped => {
            PolicyResult::NoTriggerScoped(exact_uuid_result(&mut reader)?)
        }
        ResultKind::UseNetAgent => PolicyResult::UseNetAgent(exact_uuid_result(&mut reader)?),
    };
    Ok(result)
}

pub fn encode_route_rule(rule: &RouteRule) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + rule.interface_name.len());
    buf.put_u8(rule.action.code());
    buf.put_u8(rule.flags.bits());
    buf.put_slice(rule.interface_name.as_bytes());
    buf.freeze()
}

pub fn decode_route_rule(value: &[u8]) -> Result<RouteRule, WireError> {
    let mut reader = Reader::new(value);
    let code = reader.u8()?;
    let action = RouteRuleAction::from_code(code).ok_or(WireError::UnknownRouteRule(code))?;
    let flags = RouteRuleFlags::from_bits_truncate(reader.u8()?);
    let interface_name = decode_string(reader.rest())?;
    Ok(RouteRule {
        action,
        interface_name,
        flags,
    })
}

/// TLVs describing one policy: ORDER, RESULT, ROUTE_RULE*, CONDITION*
pub fn policy_tlvs(
    order: PolicyOrder,
    conditions: &[PolicyCondition],
    result: &PolicyResult,
) -> Vec<Tlv> {
    let mut tlvs = vec![
        Tlv::u32(TLV_ORDER, order),
        Tlv::new(TLV_RESULT, encode_result(result)),
    ];
    if let PolicyResult::RouteRules(rules) = result {
        tlvs.extend(
            rules
                .iter()
                .map(|rule| Tlv::new(TLV_ROUTE_RULE, encode_route_rule(rule))),
        );
    }
    tlvs.extend(
        conditions
            .iter()
            .map(|condition| Tlv::new(TLV_CONDITION, encode_condition(condition))),
    );
    tlvs
}

/// Decoded body of a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyBody {
    pub order: PolicyOrder,
    pub conditions: Vec<PolicyCondition>,
    pub result: PolicyResult,
}

/// Reads ORDER, RESULT, ROUTE_RULE and CONDITION TLVs back into a policy body
pub fn decode_policy_tlvs(tlvs: &[Tlv]) -> Result<PolicyBody, WireError> {
    let order = find(tlvs, TLV_ORDER)
        .ok_or(WireError::MissingTlv(TLV_ORDER))?
        .as_u32()?;
    let mut result = decode_result(
        &find(tlvs, TLV_RESULT)
            .ok_or(WireError::MissingTlv(TLV_RESULT))?
            .value,
    )?;
    if let PolicyResult::RouteRules(rules) = &mut result {
        for tlv in find_all(tlvs, TLV_ROUTE_RULE) {
            rules.push(decode_route_rule(&tlv.value)?);
        }
    }
    let conditions = find_all(tlvs, TLV_CONDITION)
        .map(|tlv| decode_condition(&tlv.value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PolicyBody {
        order,
        conditions,
        result,
    })
}

fn expect_len(reader: &Reader<'_>, tlv_type: u8, len: usize) -> Result<(), WireError> {
    if reader.remaining() != len {
        return Err(WireError::invalid(
            tlv_type,
            format!("expected {} bytes, got {}", len, reader.remaining()),
        ));
    }
    Ok(())
}

fn expect_end(reader: &Reader<'_>, tlv_type: u8) -> Result<(), WireError> {
    if !reader.is_empty() {
        return Err(WireError::invalid(
            tlv_type,
            format!("{} trailing bytes after address", reader.remaining()),
        ));
    }
    Ok(())
}

fn exact_uuid(reader: &mut Reader<'_>) -> Result<Uuid, WireError> {
    expect_len(reader, TLV_CONDITION, 16)?;
    reader.uuid()
}

fn exact_uuid_result(reader: &mut Reader<'_>) -> Result<Uuid, WireError> {
    expect_len(reader, TLV_RESULT, 16)?;
    reader.uuid()
}

fn exact_u32(reader: &mut Reader<'_>) -> Result<u32, WireError> {
    expect_len(reader, TLV_RESULT, 4)?;
    reader.u32_le()
}
