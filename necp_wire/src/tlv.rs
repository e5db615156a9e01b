//! Type-length-value fields
//!
//! Every TLV is a one byte type, a four byte little-endian length and `length`
//! bytes of value. Values are kept as [`Bytes`] so nested TLV lists can be sliced
//! without copying.

use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

pub const TLV_NIL: u8 = 0;
pub const TLV_ERROR: u8 = 1;
pub const TLV_ORDER: u8 = 2;
pub const TLV_CONDITION: u8 = 3;
pub const TLV_RESULT: u8 = 4;
pub const TLV_POLICY_ID: u8 = 5;
pub const TLV_SESSION_PRIORITY: u8 = 6;
pub const TLV_ATTRIBUTE_DOMAIN: u8 = 7;
pub const TLV_ATTRIBUTE_ACCOUNT: u8 = 8;
pub const TLV_SERVICE_UUID: u8 = 9;
pub const TLV_ROUTE_RULE: u8 = 10;

// Only ever produced by the kernel side, in dumps
pub const TLV_POLICY_OWNER: u8 = 100;
pub const TLV_POLICY_DUMP: u8 = 101;
pub const TLV_POLICY_RESULT_STRING: u8 = 102;
pub const TLV_POLICY_SESSION_ORDER: u8 = 103;

/// Size of the type and length fields
pub const TLV_HEADER_LEN: usize = 5;

/// One decoded TLV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tlv_type: u8,
    pub value: Bytes,
}

impl Tlv {
    pub fn new(tlv_type: u8, value: impl Into<Bytes>) -> Self {
        Self {
            tlv_type,
            value: value.into(),
        }
    }

    pub fn empty(tlv_type: u8) -> Self {
        Self::new(tlv_type, Bytes::new())
    }

    pub fn u32(tlv_type: u8, value: u32) -> Self {
        Self::new(tlv_type, Bytes::copy_from_slice(&value.to_le_bytes()))
    }

    pub fn uuid(tlv_type: u8, value: Uuid) -> Self {
        Self::new(tlv_type, Bytes::copy_from_slice(value.as_bytes()))
    }

    pub fn string(tlv_type: u8, value: &str) -> Self {
        Self::new(tlv_type, Bytes::copy_from_slice(value.as_bytes()))
    }

    /// Reads a fixed-width u32 value
    pub fn as_u32(&self) -> Result<u32, WireError> {
        let bytes: [u8; 4] = self.value[..]
            .try_into()
            .map_err(|_| self.width_error(4))?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads a fixed-width uuid value
    pub fn as_uuid(&self) -> Result<Uuid, WireError> {
        Uuid::from_slice(&self.value).map_err(|_| self.width_error(16))
    }

    /// Reads a string value, tolerating trailing NULs
    pub fn as_string(&self) -> Result<String, WireError> {
        decode_string(&self.value)
    }

    pub fn encoded_len(&self) -> usize {
        TLV_HEADER_LEN + self.value.len()
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.tlv_type);
        buf.put_u32_le(self.value.len() as u32);
        buf.put_slice(&self.value);
    }

    fn width_error(&self, expected: usize) -> WireError {
        WireError::invalid(
            self.tlv_type,
            format!("expected {} bytes, got {}", expected, self.value.len()),
        )
    }
}

/// Appends every TLV to `buf`
pub fn encode_tlvs(tlvs: &[Tlv], buf: &mut BytesMut) {
    let total: usize = tlvs.iter().map(Tlv::encoded_len).sum();
    buf.reserve(total);
    for tlv in tlvs {
        tlv.encode(buf);
    }
}

/// Decodes a complete TLV stream
///
/// Every TLV is kept, including NIL and unknown types. A length that runs past the
/// end of `data` is an error.
pub fn decode_tlvs(data: &[u8]) -> Result<Vec<Tlv>, WireError> {
    let mut reader = Reader::new(data);
    let mut tlvs = Vec::new();
    while !reader.is_empty() {
        let tlv_type = reader.u8()?;
        let length = reader.u32_le()? as usize;
        let value = reader.take(length).map_err(|_| {
            WireError::invalid(
                tlv_type,
                format!("length {} overruns buffer ({} left)", length, reader.remaining()),
            )
        })?;
        tlvs.push(Tlv::new(tlv_type, Bytes::copy_from_slice(value)));
    }
    Ok(tlvs)
}

/// TLVs up to (not including) the first NIL
pub fn until_nil(tlvs: &[Tlv]) -> impl Iterator<Item = &Tlv> {
    tlvs.iter().take_while(|tlv| tlv.tlv_type != TLV_NIL)
}

/// First TLV of `tlv_type` before any NIL
pub fn find(tlvs: &[Tlv], tlv_type: u8) -> Option<&Tlv> {
    until_nil(tlvs).find(|tlv| tlv.tlv_type == tlv_type)
}

/// Every TLV of `tlv_type` before any NIL, in order
pub fn find_all(tlvs: &[Tlv], tlv_type: u8) -> impl Iterator<Item = &Tlv> {
    until_nil(tlvs).filter(move |tlv| tlv.tlv_type == tlv_type)
}

pub(crate) fn decode_string(value: &[u8]) -> Result<String, WireError> {
    let end = value
        .iter()
        .rposition(|b| *b != 0)
        .map(|pos| pos + 1)
        .unwrap_or(0);
    let trimmed = &value[..end];
    if trimmed.contains(&0) {
        return Err(WireError::InvalidString("embedded NUL".to_string()));
    }
    String::from_utf8(trimmed.to_vec()).map_err(|e| WireError::InvalidString(e.to_string()))
}

/// Encodes a string into a fixed-width, NUL padded field
pub(crate) fn put_fixed_string(buf: &mut impl BufMut, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(width.saturating_sub(1));
    buf.put_slice(&bytes[..len]);
    buf.put_bytes(0, width - len);
}

/// Bounds-checked reader over a byte slice
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, needed: usize) -> Result<(), WireError> {
        if self.buf.len() < needed {
            return Err(WireError::Truncated {
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, WireError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16_be(&mut self) -> Result<u16, WireError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn u16_le(&mut self) -> Result<u16, WireError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn u32_le(&mut self) -> Result<u32, WireError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn i32_le(&mut self) -> Result<i32, WireError> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn u64_le(&mut self) -> Result<u64, WireError> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn uuid(&mut self) -> Result<Uuid, WireError> {
        let mut raw = [0u8; 16];
        raw.copy_from_slice(self.take(16)?);
        Ok(Uuid::from_bytes(raw))
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.buf = &[];
        rest
    }
}
