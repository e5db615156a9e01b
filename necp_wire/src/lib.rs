//! # NECP Wire Format
//!
//! This crate defines the binary encoding of NECP control packets and client
//! action buffers.
//!
//! ## Philosophy
//!
//! - **Typed at the edge**: raw TLVs are decoded into [`Command`] and
//!   [`Response`] values and never travel further
//! - **Strict widths, lenient streams**: a fixed-width value with the wrong length
//!   is an error, an unknown TLV type is skipped
//! - **Never trust a length**: every read is bounds-checked
//!
//! ## Layout
//!
//! A packet is a six byte header (type, flags, little-endian message id) followed
//! by TLVs of one type byte, a four byte little-endian length and the value.
//! Addresses use the BSD `sockaddr_in` / `sockaddr_in6` layout.

pub mod client_codec;
pub mod command;
pub mod error;
pub mod packet;
pub mod policy_codec;
pub mod response;
pub mod sockaddr;
pub mod tlv;

pub use client_codec::{
    decode_client_list, decode_interface_details, decode_netagent, decode_parameters,
    decode_statistics, encode_client_list, encode_interface_details, encode_netagent,
    encode_parameters, encode_statistics, ClientResultView,
};
pub use command::Command;
pub use error::WireError;
pub use packet::{Packet, PacketFlags, PacketHeader, PacketType, PACKET_HEADER_LEN};
pub use policy_codec::{
    decode_condition, decode_result, decode_route_rule, encode_condition, encode_result,
    encode_route_rule, PolicyBody,
};
pub use response::{DumpEntry, Response, ResponseBody};
pub use tlv::{decode_tlvs, encode_tlvs, Tlv};
