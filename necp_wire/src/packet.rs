//! Control packet framing
//!
//! A packet is a six byte header followed by a TLV stream.

use crate::tlv::{decode_tlvs, encode_tlvs, Reader, Tlv};
use crate::WireError;
use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of an encoded packet header
pub const PACKET_HEADER_LEN: usize = 6;

/// Control packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketType {
    PolicyAdd = 1,
    PolicyGet = 2,
    PolicyDelete = 3,
    PolicyApplyAll = 4,
    PolicyListAll = 5,
    PolicyDeleteAll = 6,
    SetSessionPriority = 7,
    LockSessionToProc = 8,
    RegisterService = 9,
    UnregisterService = 10,
    PolicyDumpAll = 11,
}

impl PacketType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let packet_type = match code {
            1 => PacketType::PolicyAdd,
            2 => PacketType::PolicyGet,
            3 => PacketType::PolicyDelete,
            4 => PacketType::PolicyApplyAll,
            5 => PacketType::PolicyListAll,
            6 => PacketType::PolicyDeleteAll,
            7 => PacketType::SetSessionPriority,
            8 => PacketType::LockSessionToProc,
            9 => PacketType::RegisterService,
            10 => PacketType::UnregisterService,
            11 => PacketType::PolicyDumpAll,
            _ => return None,
        };
        Some(packet_type)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::PolicyAdd => "POLICY_ADD",
            PacketType::PolicyGet => "POLICY_GET",
            PacketType::PolicyDelete => "POLICY_DELETE",
            PacketType::PolicyApplyAll => "POLICY_APPLY_ALL",
            PacketType::PolicyListAll => "POLICY_LIST_ALL",
            PacketType::PolicyDeleteAll => "POLICY_DELETE_ALL",
            PacketType::SetSessionPriority => "SET_SESSION_PRIORITY",
            PacketType::LockSessionToProc => "LOCK_SESSION_TO_PROC",
            PacketType::RegisterService => "REGISTER_SERVICE",
            PacketType::UnregisterService => "UNREGISTER_SERVICE",
            PacketType::PolicyDumpAll => "POLICY_DUMP_ALL",
        };
        f.write_str(name)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PacketFlags: u8 {
        /// Set on every packet sent back to a session
        const RESPONSE = 0x01;
    }
}

/// Packet header
///
/// The packet type stays raw so an unknown type can still be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketHeader {
    pub packet_type: u8,
    pub flags: PacketFlags,
    pub message_id: u32,
}

impl PacketHeader {
    pub fn request(packet_type: PacketType, message_id: u32) -> Self {
        Self {
            packet_type: packet_type.code(),
            flags: PacketFlags::empty(),
            message_id,
        }
    }

    /// Header of the response to this request
    pub fn response(&self) -> Self {
        Self {
            packet_type: self.packet_type,
            flags: PacketFlags::RESPONSE,
            message_id: self.message_id,
        }
    }

    pub fn is_response(&self) -> bool {
        self.flags.contains(PacketFlags::RESPONSE)
    }

    pub fn kind(&self) -> Option<PacketType> {
        PacketType::from_code(self.packet_type)
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.packet_type);
        buf.put_u8(self.flags.bits());
        buf.put_u32_le(self.message_id);
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(data);
        let packet_type = reader.u8()?;
        let flags = PacketFlags::from_bits_retain(reader.u8()?);
        let message_id = reader.u32_le()?;
        Ok(Self {
            packet_type,
            flags,
            message_id,
        })
    }
}

/// A framed packet: header plus ordered TLVs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub tlvs: Vec<Tlv>,
}

impl Packet {
    pub fn new(header: PacketHeader) -> Self {
        Self {
            header,
            tlvs: Vec::new(),
        }
    }

    pub fn with_tlv(mut self, tlv: Tlv) -> Self {
        self.tlvs.push(tlv);
        self
    }

    pub fn with_tlvs(mut self, tlvs: impl IntoIterator<Item = Tlv>) -> Self {
        self.tlvs.extend(tlvs);
        self
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_LEN);
        self.header.encode(&mut buf);
        encode_tlvs(&self.tlvs, &mut buf);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let header = PacketHeader::decode(data)?;
        let tlvs = decode_tlvs(&data[PACKET_HEADER_LEN..])?;
        Ok(Self { header, tlvs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::TLV_ORDER;

    #[test]
    fn test_header_layout() {
        let header = PacketHeader::request(PacketType::PolicyGet, 0x0403_0201);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(&buf[..], &[2, 0, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_response_echoes_message_id() {
        let request = PacketHeader::request(PacketType::PolicyAdd, 77);
        let response = request.response();
        assert!(response.is_response());
        assert_eq!(response.message_id, 77);
        assert_eq!(response.kind(), Some(PacketType::PolicyAdd));
    }

    #[test]
    fn test_packet_decode() {
        let packet = Packet::new(PacketHeader::request(PacketType::PolicyAdd, 1))
            .with_tlv(Tlv::u32(TLV_ORDER, 10));
        let decoded = Packet::decode(&packet.encode()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_short_header_fails() {
        assert!(matches!(
            Packet::decode(&[1, 0, 0]),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unknown_packet_type_kept_raw() {
        let header = PacketHeader::decode(&[42, 0, 1, 0, 0, 0]).unwrap();
        assert_eq!(header.packet_type, 42);
        assert!(header.kind().is_none());
    }
}
