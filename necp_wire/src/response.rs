//! Typed session responses
//!
//! Every command gets exactly one response echoing its packet type and message
//! id. A failed command carries a single ERROR TLV and nothing else.

use crate::packet::{Packet, PacketFlags, PacketHeader, PacketType};
use crate::policy_codec::{decode_policy_tlvs, policy_tlvs, PolicyBody};
use crate::tlv::{
    decode_tlvs, encode_tlvs, find, find_all, Tlv, TLV_ERROR, TLV_POLICY_DUMP, TLV_POLICY_ID,
    TLV_POLICY_OWNER, TLV_POLICY_RESULT_STRING, TLV_POLICY_SESSION_ORDER, TLV_SESSION_PRIORITY,
};
use crate::WireError;
use bytes::{Bytes, BytesMut};
use core_types::{NecpError, Policy, PolicyCondition, PolicyId, PolicyOrder, PolicyResult, SessionPriority};
use serde::Serialize;

/// One policy as reported by a dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpEntry {
    pub policy_id: PolicyId,
    pub order: PolicyOrder,
    pub session_priority: SessionPriority,
    pub session_order: u32,
    /// Name of the owning session
    pub owner: String,
    pub result: PolicyResult,
    pub conditions: Vec<PolicyCondition>,
}

impl DumpEntry {
    fn to_tlv(&self) -> Tlv {
        let mut nested = vec![
            Tlv::u32(TLV_POLICY_ID, self.policy_id.get()),
            Tlv::u32(TLV_SESSION_PRIORITY, self.session_priority.code()),
            Tlv::u32(TLV_POLICY_SESSION_ORDER, self.session_order),
            Tlv::string(TLV_POLICY_OWNER, &self.owner),
            Tlv::string(TLV_POLICY_RESULT_STRING, &self.result.to_string()),
        ];
        nested.extend(policy_tlvs(self.order, &self.conditions, &self.result));
        let mut buf = BytesMut::new();
        encode_tlvs(&nested, &mut buf);
        Tlv::new(TLV_POLICY_DUMP, buf.freeze())
    }

    fn from_tlv(tlv: &Tlv) -> Result<Self, WireError> {
        let nested = decode_tlvs(&tlv.value)?;
        let policy_id = PolicyId::new(
            find(&nested, TLV_POLICY_ID)
                .ok_or(WireError::MissingTlv(TLV_POLICY_ID))?
                .as_u32()?,
        );
        let priority_code = find(&nested, TLV_SESSION_PRIORITY)
            .ok_or(WireError::MissingTlv(TLV_SESSION_PRIORITY))?
            .as_u32()?;
        let session_priority = SessionPriority::from_code(priority_code).ok_or_else(|| {
            WireError::invalid(TLV_SESSION_PRIORITY, format!("priority {}", priority_code))
        })?;
        let session_order = match find(&nested, TLV_POLICY_SESSION_ORDER) {
            Some(tlv) => tlv.as_u32()?,
            None => 0,
        };
        let owner = match find(&nested, TLV_POLICY_OWNER) {
            Some(tlv) => tlv.as_string()?,
            None => String::new(),
        };
        let body = decode_policy_tlvs(&nested)?;
        Ok(Self {
            policy_id,
            order: body.order,
            session_priority,
            session_order,
            owner,
            result: body.result,
            conditions: body.conditions,
        })
    }
}

/// Successful response payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Empty,
    PolicyId(PolicyId),
    Policy(PolicyBody),
    PolicyIds(Vec<PolicyId>),
    Dump(Vec<DumpEntry>),
}

impl ResponseBody {
    pub fn policy(policy: &Policy) -> Self {
        ResponseBody::Policy(PolicyBody {
            order: policy.order,
            conditions: policy.conditions.clone(),
            result: policy.result.clone(),
        })
    }

    fn tlvs(&self) -> Vec<Tlv> {
        match self {
            ResponseBody::Empty => Vec::new(),
            ResponseBody::PolicyId(id) => vec![Tlv::u32(TLV_POLICY_ID, id.get())],
            ResponseBody::Policy(body) => policy_tlvs(body.order, &body.conditions, &body.result),
            ResponseBody::PolicyIds(ids) => ids
                .iter()
                .map(|id| Tlv::u32(TLV_POLICY_ID, id.get()))
                .collect(),
            ResponseBody::Dump(entries) => entries.iter().map(DumpEntry::to_tlv).collect(),
        }
    }
}

/// A response to one session command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub packet_type: u8,
    pub message_id: u32,
    pub outcome: Result<ResponseBody, NecpError>,
}

impl Response {
    pub fn ok(request: &PacketHeader, body: ResponseBody) -> Self {
        Self {
            packet_type: request.packet_type,
            message_id: request.message_id,
            outcome: Ok(body),
        }
    }

    pub fn error(request: &PacketHeader, error: NecpError) -> Self {
        Self {
            packet_type: request.packet_type,
            message_id: request.message_id,
            outcome: Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn to_packet(&self) -> Packet {
        let header = PacketHeader {
            packet_type: self.packet_type,
            flags: PacketFlags::RESPONSE,
            message_id: self.message_id,
        };
        let tlvs = match &self.outcome {
            Ok(body) => body.tlvs(),
            Err(error) => vec![Tlv::u32(TLV_ERROR, error.code())],
        };
        Packet::new(header).with_tlvs(tlvs)
    }

    pub fn encode(&self) -> Bytes {
        self.to_packet().encode()
    }

    /// Decodes a response, interpreting its TLVs by packet type
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let packet = Packet::decode(data)?;
        let header = packet.header;
        let tlvs = &packet.tlvs;
        if let Some(error) = find(tlvs, TLV_ERROR) {
            let error = NecpError::from_code(error.as_u32()?).unwrap_or(NecpError::Internal);
            return Ok(Self::error(&header, error));
        }
        let body = match header.kind() {
            Some(PacketType::PolicyAdd) => ResponseBody::PolicyId(PolicyId::new(
                find(tlvs, TLV_POLICY_ID)
                    .ok_or(WireError::MissingTlv(TLV_POLICY_ID))?
                    .as_u32()?,
            )),
            Some(PacketType::PolicyGet) => ResponseBody::Policy(decode_policy_tlvs(tlvs)?),
            Some(PacketType::PolicyListAll) => ResponseBody::PolicyIds(
                find_all(tlvs, TLV_POLICY_ID)
                    .map(|tlv| tlv.as_u32().map(PolicyId::new))
                    .collect::<Result<_, _>>()?,
            ),
            Some(PacketType::PolicyDumpAll) => ResponseBody::Dump(
                find_all(tlvs, TLV_POLICY_DUMP)
                    .map(DumpEntry::from_tlv)
                    .collect::<Result<_, _>>()?,
            ),
            _ => ResponseBody::Empty,
        };
        Ok(Self::ok(&header, body))
    }
}
