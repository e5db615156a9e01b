//! BSD socket address layout

use crate::tlv::Reader;
use crate::WireError;
use bytes::BufMut;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

pub const AF_UNSPEC: u8 = 0;
pub const AF_INET: u8 = 2;
pub const AF_INET6: u8 = 30;

pub const SOCKADDR_IN_LEN: usize = 16;
pub const SOCKADDR_IN6_LEN: usize = 28;

/// Encoded length of `addr`
pub fn sockaddr_len(addr: &SocketAddr) -> usize {
    match addr {
        SocketAddr::V4(_) => SOCKADDR_IN_LEN,
        SocketAddr::V6(_) => SOCKADDR_IN6_LEN,
    }
}

pub fn put_sockaddr(buf: &mut impl BufMut, addr: &SocketAddr) {
    match addr {
        SocketAddr::V4(v4) => {
            buf.put_u8(SOCKADDR_IN_LEN as u8);
            buf.put_u8(AF_INET);
            buf.put_u16(v4.port());
            buf.put_slice(&v4.ip().octets());
            buf.put_bytes(0, 8);
        }
        SocketAddr::V6(v6) => {
            buf.put_u8(SOCKADDR_IN6_LEN as u8);
            buf.put_u8(AF_INET6);
            buf.put_u16(v6.port());
            buf.put_u32_le(v6.flowinfo());
            buf.put_slice(&v6.ip().octets());
            buf.put_u32_le(v6.scope_id());
        }
    }
}

pub(crate) fn read_sockaddr(reader: &mut Reader<'_>) -> Result<SocketAddr, WireError> {
    let len = reader.u8()? as usize;
    let family = reader.u8()?;
    let port = reader.u16_be()?;
    match family {
        AF_INET => {
            if len != SOCKADDR_IN_LEN {
                return Err(WireError::InvalidAddress(format!(
                    "sockaddr_in length {}",
                    len
                )));
            }
            let octets: [u8; 4] = take_array(reader)?;
            reader.take(8)?;
            Ok(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(octets), port)))
        }
        AF_INET6 => {
            if len != SOCKADDR_IN6_LEN {
                return Err(WireError::InvalidAddress(format!(
                    "sockaddr_in6 length {}",
                    len
                )));
            }
            let flowinfo = reader.u32_le()?;
            let octets: [u8; 16] = take_array(reader)?;
            let scope_id = reader.u32_le()?;
            Ok(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(octets),
                port,
                flowinfo,
                scope_id,
            )))
        }
        other => Err(WireError::InvalidAddress(format!("family {}", other))),
    }
}

/// Decodes exactly one socket address filling `data`
pub fn decode_sockaddr(data: &[u8]) -> Result<SocketAddr, WireError> {
    let mut reader = Reader::new(data);
    let addr = read_sockaddr(&mut reader)?;
    if !reader.is_empty() {
        return Err(WireError::InvalidAddress(format!(
            "{} trailing bytes",
            reader.remaining()
        )));
    }
    Ok(addr)
}

fn take_array<const N: usize>(reader: &mut Reader<'_>) -> Result<[u8; N], WireError> {
    let mut out = [0u8; N];
    out.copy_from_slice(reader.take(N)?);
    Ok(out)
}
