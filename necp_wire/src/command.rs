//! Typed session commands
//!
//! Packets sent by a session decode into a closed [`Command`] enum. Nothing past
//! this module ever looks at raw TLVs.

use crate::packet::{Packet, PacketHeader, PacketType};
use crate::policy_codec::{decode_policy_tlvs, policy_tlvs};
use crate::tlv::{find, Tlv, TLV_POLICY_ID, TLV_SERVICE_UUID, TLV_SESSION_PRIORITY};
use crate::WireError;
use bytes::Bytes;
use core_types::{PolicyCondition, PolicyId, PolicyOrder, PolicyResult, SessionPriority};
use uuid::Uuid;

/// A decoded session command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PolicyAdd {
        order: PolicyOrder,
        conditions: Vec<PolicyCondition>,
        result: PolicyResult,
    },
    PolicyGet(PolicyId),
    PolicyDelete(PolicyId),
    PolicyApplyAll,
    PolicyListAll,
    PolicyDeleteAll,
    SetSessionPriority(SessionPriority),
    LockSessionToProc,
    RegisterService(Uuid),
    UnregisterService(Uuid),
    PolicyDumpAll,
}

impl Command {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Command::PolicyAdd { .. } => PacketType::PolicyAdd,
            Command::PolicyGet(_) => PacketType::PolicyGet,
            Command::PolicyDelete(_) => PacketType::PolicyDelete,
            Command::PolicyApplyAll => PacketType::PolicyApplyAll,
            Command::PolicyListAll => PacketType::PolicyListAll,
            Command::PolicyDeleteAll => PacketType::PolicyDeleteAll,
            Command::SetSessionPriority(_) => PacketType::SetSessionPriority,
            Command::LockSessionToProc => PacketType::LockSessionToProc,
            Command::RegisterService(_) => PacketType::RegisterService,
            Command::UnregisterService(_) => PacketType::UnregisterService,
            Command::PolicyDumpAll => PacketType::PolicyDumpAll,
        }
    }

    /// Builds the request packet for this command
    pub fn to_packet(&self, message_id: u32) -> Packet {
        let header = PacketHeader::request(self.packet_type(), message_id);
        let tlvs = match self {
            Command::PolicyAdd {
                order,
                conditions,
                result,
            } => policy_tlvs(*order, conditions, result),
            Command::PolicyGet(id) | Command::PolicyDelete(id) => {
                vec![Tlv::u32(TLV_POLICY_ID, id.get())]
            }
            Command::SetSessionPriority(priority) => {
                vec![Tlv::u32(TLV_SESSION_PRIORITY, priority.code())]
            }
            Command::RegisterService(uuid) | Command::UnregisterService(uuid) => {
                vec![Tlv::uuid(TLV_SERVICE_UUID, *uuid)]
            }
            Command::PolicyApplyAll
            | Command::PolicyListAll
            | Command::PolicyDeleteAll
            | Command::LockSessionToProc
            | Command::PolicyDumpAll => Vec::new(),
        };
        Packet::new(header).with_tlvs(tlvs)
    }

    pub fn encode(&self, message_id: u32) -> Bytes {
        self.to_packet(message_id).encode()
    }

    /// Interprets a decoded packet as a command
    pub fn from_packet(packet: &Packet) -> Result<Self, WireError> {
        let packet_type = packet
            .header
            .kind()
            .ok_or(WireError::UnknownPacketType(packet.header.packet_type))?;
        let tlvs = &packet.tlvs;
        let command = match packet_type {
            PacketType::PolicyAdd => {
                let body = decode_policy_tlvs(tlvs)?;
                Command::PolicyAdd {
                    order: body.order,
                    conditions: body.conditions,
                    result: body.result,
                }
            }
            PacketType::PolicyGet => Command::PolicyGet(policy_id(tlvs)?),
            PacketType::PolicyDelete => Command::PolicyDelete(policy_id(tlvs)?),
            PacketType::PolicyApplyAll => Command::PolicyApplyAll,
            PacketType::PolicyListAll => Command::PolicyListAll,
            PacketType::PolicyDeleteAll => Command::PolicyDeleteAll,
            PacketType::SetSessionPriority => {
                let tlv = find(tlvs, TLV_SESSION_PRIORITY)
                    .ok_or(WireError::MissingTlv(TLV_SESSION_PRIORITY))?;
                let code = tlv.as_u32()?;
                let priority = SessionPriority::from_code(code).ok_or_else(|| {
                    WireError::invalid(TLV_SESSION_PRIORITY, format!("priority {}", code))
                })?;
                Command::SetSessionPriority(priority)
            }
            PacketType::LockSessionToProc => Command::LockSessionToProc,
            PacketType::RegisterService => Command::RegisterService(service_uuid(tlvs)?),
            PacketType::UnregisterService => Command::UnregisterService(service_uuid(tlvs)?),
            PacketType::PolicyDumpAll => Command::PolicyDumpAll,
        };
        Ok(command)
    }
}

fn policy_id(tlvs: &[Tlv]) -> Result<PolicyId, WireError> {
    let tlv = find(tlvs, TLV_POLICY_ID).ok_or(WireError::MissingTlv(TLV_POLICY_ID))?;
    Ok(PolicyId::new(tlv.as_u32()?))
}

fn service_uuid(tlvs: &[Tlv]) -> Result<Uuid, WireError> {
    find(tlvs, TLV_SERVICE_UUID)
        .ok_or(WireError::MissingTlv(TLV_SERVICE_UUID))?
        .as_uuid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Condition;

    fn through_wire(command: &Command) -> Command {
        let packet = Packet::decode(&command.encode(9)).unwrap();
        assert_eq!(packet.header.message_id, 9);
        Command::from_packet(&packet).unwrap()
    }

    #[test]
    fn test_policy_add_decodes() {
        let command = Command::PolicyAdd {
            order: 10,
            conditions: vec![PolicyCondition::new(Condition::Domain("apple.com".into()))],
            result: PolicyResult::Drop,
        };
        assert_eq!(through_wire(&command), command);
    }

    #[test]
    fn test_priority_decodes() {
        let command = Command::SetSessionPriority(SessionPriority::High);
        assert_eq!(through_wire(&command), command);
    }

    #[test]
    fn test_bad_priority_is_invalid_tlv() {
        let packet = Packet::new(PacketHeader::request(PacketType::SetSessionPriority, 1))
            .with_tlv(Tlv::u32(TLV_SESSION_PRIORITY, 9));
        assert!(matches!(
            Command::from_packet(&packet),
            Err(WireError::InvalidTlv { .. })
        ));
    }

    #[test]
    fn test_unknown_packet_type() {
        let packet = Packet::new(PacketHeader {
            packet_type: 12,
            flags: Default::default(),
            message_id: 3,
        });
        assert_eq!(
            Command::from_packet(&packet),
            Err(WireError::UnknownPacketType(12))
        );
    }

    #[test]
    fn test_get_without_id() {
        let packet = Packet::new(PacketHeader::request(PacketType::PolicyGet, 1));
        assert_eq!(
            Command::from_packet(&packet),
            Err(WireError::MissingTlv(TLV_POLICY_ID))
        );
    }

    #[test]
    fn test_short_service_uuid() {
        let packet = Packet::new(PacketHeader::request(PacketType::RegisterService, 1))
            .with_tlv(Tlv::new(TLV_SERVICE_UUID, vec![0u8; 4]));
        assert!(Command::from_packet(&packet).is_err());
    }
}
