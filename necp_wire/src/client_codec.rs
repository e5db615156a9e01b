//! Client action buffers
//!
//! Client parameters and results use the same TLV framing as session packets, but
//! with their own type namespaces. Fixed structures (client lists, agent and
//! interface copies, statistics) are packed little-endian.

use crate::sockaddr::{put_sockaddr, read_sockaddr, AF_UNSPEC};
use crate::tlv::{
    decode_string, decode_tlvs, encode_tlvs, put_fixed_string, until_nil, Reader, Tlv,
};
use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use core_types::{
    AgentType, AggregateResult, BasicMetadata, ClientId, ClientParameter, ClientResultFlags,
    ClientStatistics, Endpoint, ExtraTcpMetadata, FunctionalType, ResultKind, StatCounts,
    StatsHeader, TcpProbeStatus,
};
use kernel_api::{InterfaceDetails, InterfaceFlags, NetAgentFlags, NetAgentInfo, NexusInstance};
use std::net::SocketAddr;
use uuid::Uuid;

pub const CLIENT_RESULT_CLIENT_ID: u8 = 1;
pub const CLIENT_RESULT_POLICY_RESULT: u8 = 2;
pub const CLIENT_RESULT_POLICY_RESULT_PARAMETER: u8 = 3;
pub const CLIENT_RESULT_FILTER_CONTROL_UNIT: u8 = 4;
pub const CLIENT_RESULT_INTERFACE_INDEX: u8 = 5;
pub const CLIENT_RESULT_NETAGENT: u8 = 6;
pub const CLIENT_RESULT_FLAGS: u8 = 7;
pub const CLIENT_RESULT_INTERFACE: u8 = 8;
pub const CLIENT_RESULT_NEXUS_INSTANCE: u8 = 100;
pub const CLIENT_RESULT_NEXUS_PORT: u8 = 101;

/// Width of the interface name field in interface details
pub const INTERFACE_NAME_LEN: usize = 24;
/// Width of each address family signature in interface details
pub const INTERFACE_SIGNATURE_LEN: usize = 20;
pub const INTERFACE_DETAILS_LEN: usize = INTERFACE_NAME_LEN + 6 * 4 + 2 * INTERFACE_SIGNATURE_LEN;

pub const NETAGENT_DOMAIN_LEN: usize = 32;
pub const NETAGENT_TYPE_LEN: usize = 32;
pub const NETAGENT_DESCRIPTION_LEN: usize = 128;
pub const NETAGENT_LEN: usize =
    NETAGENT_DOMAIN_LEN + NETAGENT_TYPE_LEN + NETAGENT_DESCRIPTION_LEN + 16 + 3 * 4;

/// Length, family, port and endpoint type ahead of an endpoint name
pub const ENDPOINT_NAME_HEADER_LEN: usize = 8;
/// Longest endpoint name whose length still fits the one byte header
pub const MAX_ENDPOINT_NAME_LEN: usize = u8::MAX as usize - ENDPOINT_NAME_HEADER_LEN;

pub const STATS_HEADER_LEN: usize = 16;
pub const STAT_COUNTS_LEN: usize = 4 * 8 + 8 * 4 + 6 * 8;
pub const BASIC_METADATA_LEN: usize = 4 + 4 + 8 + 4 + 16 + 2;
pub const EXTRA_TCP_METADATA_LEN: usize = 9 * 4;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

fn parameter_value(parameter: &ClientParameter) -> Result<Bytes, WireError> {
    let mut buf = BytesMut::new();
    match parameter {
        ClientParameter::Application(uuid)
        | ClientParameter::RealApplication(uuid)
        | ClientParameter::ProhibitAgent(uuid)
        | ClientParameter::RequireAgent(uuid)
        | ClientParameter::PreferAgent(uuid)
        | ClientParameter::TriggerAgent(uuid)
        | ClientParameter::AssertAgent(uuid)
        | ClientParameter::UnassertAgent(uuid) => buf.put_slice(uuid.as_bytes()),
        ClientParameter::Domain(s)
        | ClientParameter::Account(s)
        | ClientParameter::BoundInterface(s)
        | ClientParameter::ProhibitInterface(s) => buf.put_slice(s.as_bytes()),
        ClientParameter::Pid(pid) => buf.put_i32_le(*pid),
        ClientParameter::Uid(uid) => buf.put_u32_le(*uid),
        ClientParameter::TrafficClass(tc) => buf.put_u32_le(*tc),
        ClientParameter::IpProtocol(proto) => buf.put_u8(*proto),
        ClientParameter::LocalAddress(addr) | ClientParameter::RemoteAddress(addr) => {
            buf.put_u8(full_prefix(addr));
            put_sockaddr(&mut buf, addr);
        }
        ClientParameter::ProhibitInterfaceType(ft) | ClientParameter::RequireInterfaceType(ft) => {
            buf.put_u8(ft.code())
        }
        ClientParameter::ProhibitAgentType(agent_type)
        | ClientParameter::RequireAgentType(agent_type)
        | ClientParameter::PreferAgentType(agent_type) => {
            put_fixed_string(&mut buf, &agent_type.domain, AgentType::FIELD_LEN);
            put_fixed_string(&mut buf, &agent_type.agent_type, AgentType::FIELD_LEN);
        }
        ClientParameter::LocalEndpoint(endpoint) | ClientParameter::RemoteEndpoint(endpoint) => {
            put_endpoint(&mut buf, endpoint, parameter.code())?
        }
    }
    Ok(buf.freeze())
}

fn full_prefix(addr: &SocketAddr) -> u8 {
    match addr {
        SocketAddr::V4(_) => 32,
        SocketAddr::V6(_) => 128,
    }
}

fn put_endpoint(
    buf: &mut BytesMut,
    endpoint: &Endpoint,
    tlv_type: u8,
) -> Result<(), WireError> {
    match endpoint {
        Endpoint::Address(addr) => put_sockaddr(buf, addr),
        Endpoint::Name {
            name,
            port,
            endpoint_type,
        } => {
            if name.len() > MAX_ENDPOINT_NAME_LEN {
                return Err(WireError::invalid(
                    tlv_type,
                    format!(
                        "endpoint name is {} bytes, limit {}",
                        name.len(),
                        MAX_ENDPOINT_NAME_LEN
                    ),
                ));
            }
            buf.put_u8((ENDPOINT_NAME_HEADER_LEN + name.len()) as u8);
            buf.put_u8(AF_UNSPEC);
            buf.put_u16(*port);
            buf.put_u32_le(*endpoint_type);
            buf.put_slice(name.as_bytes());
        }
    }
    Ok(())
}

fn read_endpoint(value: &[u8], tlv_type: u8) -> Result<Endpoint, WireError> {
    if value.len() >= 2 && value[1] == AF_UNSPEC {
        let mut reader = Reader::new(value);
        reader.u8()?;
        reader.u8()?;
        let port = reader.u16_be()?;
        let endpoint_type = reader.u32_le()?;
        let name = decode_string(reader.rest())?;
        return Ok(Endpoint::Name {
            name,
            port,
            endpoint_type,
        });
    }
    let mut reader = Reader::new(value);
    let addr = read_sockaddr(&mut reader)?;
    if !reader.is_empty() {
        return Err(WireError::invalid(tlv_type, "trailing bytes after endpoint"));
    }
    Ok(Endpoint::Address(addr))
}

pub fn parameter_tlv(parameter: &ClientParameter) -> Result<Tlv, WireError> {
    Ok(Tlv::new(parameter.code(), parameter_value(parameter)?))
}

/// Encodes a parameter buffer. Fails on a value the layout cannot carry.
pub fn encode_parameters(parameters: &[ClientParameter]) -> Result<Bytes, WireError> {
    let tlvs = parameters
        .iter()
        .map(parameter_tlv)
        .collect::<Result<Vec<_>, _>>()?;
    let mut buf = BytesMut::new();
    encode_tlvs(&tlvs, &mut buf);
    Ok(buf.freeze())
}

/// Decodes a parameter buffer. Unknown parameter types are skipped and a NIL
/// ends the list.
pub fn decode_parameters(data: &[u8]) -> Result<Vec<ClientParameter>, WireError> {
    let tlvs = decode_tlvs(data)?;
    let mut parameters = Vec::new();
    for tlv in until_nil(&tlvs) {
        if let Some(parameter) = decode_parameter(tlv)? {
            parameters.push(parameter);
        }
    }
    Ok(parameters)
}

fn decode_parameter(tlv: &Tlv) -> Result<Option<ClientParameter>, WireError> {
    let t = tlv.tlv_type;
    let value = &tlv.value[..];
    let parameter = match t {
        ClientParameter::CODE_APPLICATION => ClientParameter::Application(tlv.as_uuid()?),
        ClientParameter::CODE_REAL_APPLICATION => {
            ClientParameter::RealApplication(tlv.as_uuid()?)
        }
        ClientParameter::CODE_DOMAIN => ClientParameter::Domain(tlv.as_string()?),
        ClientParameter::CODE_ACCOUNT => ClientParameter::Account(tlv.as_string()?),
        ClientParameter::CODE_PID => ClientParameter::Pid(tlv.as_u32()? as i32),
        ClientParameter::CODE_UID => ClientParameter::Uid(tlv.as_u32()?),
        ClientParameter::CODE_BOUND_INTERFACE => {
            ClientParameter::BoundInterface(tlv.as_string()?)
        }
        ClientParameter::CODE_TRAFFIC_CLASS => ClientParameter::TrafficClass(tlv.as_u32()?),
        ClientParameter::CODE_IP_PROTOCOL => {
            if value.len() != 1 {
                return Err(WireError::invalid(t, "expected 1 byte"));
            }
            ClientParameter::IpProtocol(value[0])
        }
        ClientParameter::CODE_LOCAL_ADDRESS | ClientParameter::CODE_REMOTE_ADDRESS => {
            let mut reader = Reader::new(value);
            reader.u8()?;
            let addr = read_sockaddr(&mut reader)?;
            if !reader.is_empty() {
                return Err(WireError::invalid(t, "trailing bytes after address"));
            }
            if t == ClientParameter::CODE_LOCAL_ADDRESS {
                ClientParameter::LocalAddress(addr)
            } else {
                ClientParameter::RemoteAddress(addr)
            }
        }
        ClientParameter::CODE_PROHIBIT_INTERFACE => {
            ClientParameter::ProhibitInterface(tlv.as_string()?)
        }
        ClientParameter::CODE_PROHIBIT_IF_TYPE => {
            ClientParameter::ProhibitInterfaceType(functional_type(tlv)?)
        }
        ClientParameter::CODE_REQUIRE_IF_TYPE => {
            ClientParameter::RequireInterfaceType(functional_type(tlv)?)
        }
        ClientParameter::CODE_PROHIBIT_AGENT => ClientParameter::ProhibitAgent(tlv.as_uuid()?),
        ClientParameter::CODE_REQUIRE_AGENT => ClientParameter::RequireAgent(tlv.as_uuid()?),
        ClientParameter::CODE_PREFER_AGENT => ClientParameter::PreferAgent(tlv.as_uuid()?),
        ClientParameter::CODE_PROHIBIT_AGENT_TYPE => {
            ClientParameter::ProhibitAgentType(agent_type(tlv)?)
        }
        ClientParameter::CODE_REQUIRE_AGENT_TYPE => {
            ClientParameter::RequireAgentType(agent_type(tlv)?)
        }
        ClientParameter::CODE_PREFER_AGENT_TYPE => {
            ClientParameter::PreferAgentType(agent_type(tlv)?)
        }
        ClientParameter::CODE_TRIGGER_AGENT => ClientParameter::TriggerAgent(tlv.as_uuid()?),
        ClientParameter::CODE_ASSERT_AGENT => ClientParameter::AssertAgent(tlv.as_uuid()?),
        ClientParameter::CODE_UNASSERT_AGENT => ClientParameter::UnassertAgent(tlv.as_uuid()?),
        ClientParameter::CODE_LOCAL_ENDPOINT => {
            ClientParameter::LocalEndpoint(read_endpoint(value, t)?)
        }
        ClientParameter::CODE_REMOTE_ENDPOINT => {
            ClientParameter::RemoteEndpoint(read_endpoint(value, t)?)
        }
        _ => return Ok(None),
    };
    Ok(Some(parameter))
}

fn functional_type(tlv: &Tlv) -> Result<FunctionalType, WireError> {
    if tlv.value.len() != 1 {
        return Err(WireError::invalid(tlv.tlv_type, "expected 1 byte"));
    }
    FunctionalType::from_code(tlv.value[0]).ok_or_else(|| {
        WireError::invalid(tlv.tlv_type, format!("functional type {}", tlv.value[0]))
    })
}

fn agent_type(tlv: &Tlv) -> Result<AgentType, WireError> {
    if tlv.value.len() != 2 * AgentType::FIELD_LEN {
        return Err(WireError::invalid(tlv.tlv_type, "expected 64 bytes"));
    }
    let (domain, agent_type) = tlv.value.split_at(AgentType::FIELD_LEN);
    Ok(AgentType::new(
        decode_string(domain)?,
        decode_string(agent_type)?,
    ))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// The client-visible part of an aggregate result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientResultView {
    pub client_id: ClientId,
    pub routing_result: u32,
    pub routing_parameter: u32,
    pub filter_control_unit: u32,
    pub interface_index: u32,
    pub flags: ClientResultFlags,
    /// Generation and index of the routed interface
    pub interface: Option<(u32, u32)>,
    /// Generation and uuid of each agent to use
    pub netagents: Vec<(u32, Uuid)>,
    pub nexus: Option<NexusInstance>,
}

impl ClientResultView {
    pub fn new(
        client_id: ClientId,
        result: &AggregateResult,
        interface_generation: Option<u32>,
        nexus: Option<NexusInstance>,
    ) -> Self {
        let interface = match (result.routed_interface_index, interface_generation) {
            (0, _) => None,
            (index, generation) => Some((generation.unwrap_or(0), index)),
        };
        Self {
            client_id,
            routing_result: result.routing_result.code() as u32,
            routing_parameter: result.routing_parameter.raw(),
            filter_control_unit: result.filter_control_unit,
            interface_index: result.routed_interface_index,
            flags: result.flags,
            interface,
            netagents: result
                .netagents
                .iter()
                .map(|agent| (agent.generation, agent.uuid))
                .collect(),
            nexus,
        }
    }

    pub fn routing_kind(&self) -> Option<ResultKind> {
        u8::try_from(self.routing_result)
            .ok()
            .and_then(ResultKind::from_code)
    }

    pub fn encode(&self) -> Bytes {
        let mut tlvs = vec![
            Tlv::uuid(CLIENT_RESULT_CLIENT_ID, self.client_id.as_uuid()),
            Tlv::u32(CLIENT_RESULT_POLICY_RESULT, self.routing_result),
            Tlv::u32(CLIENT_RESULT_POLICY_RESULT_PARAMETER, self.routing_parameter),
        ];
        if self.filter_control_unit != 0 {
            tlvs.push(Tlv::u32(
                CLIENT_RESULT_FILTER_CONTROL_UNIT,
                self.filter_control_unit,
            ));
        }
        if self.interface_index != 0 {
            tlvs.push(Tlv::u32(CLIENT_RESULT_INTERFACE_INDEX, self.interface_index));
        }
        tlvs.push(Tlv::u32(CLIENT_RESULT_FLAGS, self.flags.bits()));
        if let Some((generation, index)) = self.interface {
            let mut value = BytesMut::with_capacity(8);
            value.put_u32_le(generation);
            value.put_u32_le(index);
            tlvs.push(Tlv::new(CLIENT_RESULT_INTERFACE, value.freeze()));
        }
        for (generation, uuid) in &self.netagents {
            let mut value = BytesMut::with_capacity(20);
            value.put_u32_le(*generation);
            value.put_slice(uuid.as_bytes());
            tlvs.push(Tlv::new(CLIENT_RESULT_NETAGENT, value.freeze()));
        }
        if let Some(nexus) = &self.nexus {
            tlvs.push(Tlv::uuid(CLIENT_RESULT_NEXUS_INSTANCE, nexus.instance));
            tlvs.push(Tlv::new(
                CLIENT_RESULT_NEXUS_PORT,
                Bytes::copy_from_slice(&nexus.port.to_le_bytes()),
            ));
        }
        let mut buf = BytesMut::new();
        encode_tlvs(&tlvs, &mut buf);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut client_id = None;
        let mut view = Self {
            client_id: ClientId::from_uuid(Uuid::nil()),
            routing_result: 0,
            routing_parameter: 0,
            filter_control_unit: 0,
            interface_index: 0,
            flags: ClientResultFlags::empty(),
            interface: None,
            netagents: Vec::new(),
            nexus: None,
        };
        let mut nexus_instance = None;
        let mut nexus_port = None;
        for tlv in decode_tlvs(data)? {
            match tlv.tlv_type {
                CLIENT_RESULT_CLIENT_ID => client_id = Some(ClientId::from_uuid(tlv.as_uuid()?)),
                CLIENT_RESULT_POLICY_RESULT => view.routing_result = tlv.as_u32()?,
                CLIENT_RESULT_POLICY_RESULT_PARAMETER => view.routing_parameter = tlv.as_u32()?,
                CLIENT_RESULT_FILTER_CONTROL_UNIT => view.filter_control_unit = tlv.as_u32()?,
                CLIENT_RESULT_INTERFACE_INDEX => view.interface_index = tlv.as_u32()?,
                CLIENT_RESULT_FLAGS => {
                    view.flags = ClientResultFlags::from_bits_retain(tlv.as_u32()?)
                }
                CLIENT_RESULT_INTERFACE => {
                    let mut reader = exact(&tlv, 8)?;
                    view.interface = Some((reader.u32_le()?, reader.u32_le()?));
                }
                CLIENT_RESULT_NETAGENT => {
                    let mut reader = exact(&tlv, 20)?;
                    view.netagents.push((reader.u32_le()?, reader.uuid()?));
                }
                CLIENT_RESULT_NEXUS_INSTANCE => nexus_instance = Some(tlv.as_uuid()?),
                CLIENT_RESULT_NEXUS_PORT => nexus_port = Some(exact(&tlv, 2)?.u16_le()?),
                _ => {}
            }
        }
        view.client_id = client_id.ok_or(WireError::MissingTlv(CLIENT_RESULT_CLIENT_ID))?;
        if let Some(instance) = nexus_instance {
            view.nexus = Some(NexusInstance {
                instance,
                port: nexus_port.unwrap_or(0),
            });
        }
        Ok(view)
    }
}

fn exact<'a>(tlv: &'a Tlv, len: usize) -> Result<Reader<'a>, WireError> {
    if tlv.value.len() != len {
        return Err(WireError::invalid(
            tlv.tlv_type,
            format!("expected {} bytes, got {}", len, tlv.value.len()),
        ));
    }
    Ok(Reader::new(&tlv.value))
}

// ---------------------------------------------------------------------------
// Fixed structures
// ---------------------------------------------------------------------------

/// Client list: a u32 count followed by client uuids
pub fn encode_client_list(clients: &[ClientId]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + clients.len() * 16);
    buf.put_u32_le(clients.len() as u32);
    for client in clients {
        buf.put_slice(client.as_uuid().as_bytes());
    }
    buf.freeze()
}

pub fn decode_client_list(data: &[u8]) -> Result<Vec<ClientId>, WireError> {
    let mut reader = Reader::new(data);
    let count = reader.u32_le()? as usize;
    let mut clients = Vec::with_capacity(count.min(reader.remaining() / 16));
    for _ in 0..count {
        clients.push(ClientId::from_uuid(reader.uuid()?));
    }
    Ok(clients)
}

pub fn encode_netagent(agent: &NetAgentInfo) -> Bytes {
    let mut buf = BytesMut::with_capacity(NETAGENT_LEN);
    put_fixed_string(&mut buf, &agent.domain, NETAGENT_DOMAIN_LEN);
    put_fixed_string(&mut buf, &agent.agent_type, NETAGENT_TYPE_LEN);
    put_fixed_string(&mut buf, &agent.description, NETAGENT_DESCRIPTION_LEN);
    buf.put_slice(agent.uuid.as_bytes());
    buf.put_u32_le(agent.flags.bits());
    buf.put_u32_le(agent.generation);
    // no agent-specific data
    buf.put_u32_le(0);
    buf.freeze()
}

pub fn decode_netagent(data: &[u8]) -> Result<NetAgentInfo, WireError> {
    let mut reader = Reader::new(data);
    let domain = decode_string(reader.take(NETAGENT_DOMAIN_LEN)?)?;
    let agent_type = decode_string(reader.take(NETAGENT_TYPE_LEN)?)?;
    let description = decode_string(reader.take(NETAGENT_DESCRIPTION_LEN)?)?;
    let uuid = reader.uuid()?;
    let flags = NetAgentFlags::from_bits_retain(reader.u32_le()?);
    let generation = reader.u32_le()?;
    Ok(NetAgentInfo {
        uuid,
        domain,
        agent_type,
        description,
        generation,
        flags,
    })
}

/// Interface details. Signatures are opaque; a non-zero signature marks the
/// address family as configured.
pub fn encode_interface_details(details: &InterfaceDetails) -> Bytes {
    let mut buf = BytesMut::with_capacity(INTERFACE_DETAILS_LEN);
    put_fixed_string(&mut buf, &details.name, INTERFACE_NAME_LEN);
    buf.put_u32_le(details.index);
    buf.put_u32_le(details.generation);
    buf.put_u32_le(details.functional_type.code() as u32);
    buf.put_u32_le(details.delegate_index);
    buf.put_u32_le(details.flags.bits());
    buf.put_u32_le(details.mtu);
    for present in [details.has_ipv4, details.has_ipv6] {
        buf.put_u8(present as u8);
        buf.put_bytes(0, INTERFACE_SIGNATURE_LEN - 1);
    }
    buf.freeze()
}

pub fn decode_interface_details(data: &[u8]) -> Result<InterfaceDetails, WireError> {
    let mut reader = Reader::new(data);
    let name = decode_string(reader.take(INTERFACE_NAME_LEN)?)?;
    let index = reader.u32_le()?;
    let generation = reader.u32_le()?;
    let ft_code = reader.u32_le()?;
    let functional_type = u8::try_from(ft_code)
        .ok()
        .and_then(FunctionalType::from_code)
        .unwrap_or(FunctionalType::Unknown);
    let delegate_index = reader.u32_le()?;
    let flags = InterfaceFlags::from_bits_retain(reader.u32_le()?);
    let mtu = reader.u32_le()?;
    let has_ipv4 = reader.take(INTERFACE_SIGNATURE_LEN)?.iter().any(|b| *b != 0);
    let has_ipv6 = reader.take(INTERFACE_SIGNATURE_LEN)?.iter().any(|b| *b != 0);
    Ok(InterfaceDetails {
        name,
        index,
        generation,
        functional_type,
        delegate_index,
        flags,
        mtu,
        has_ipv4,
        has_ipv6,
        agents: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

fn stats_error(reason: impl Into<String>) -> WireError {
    WireError::InvalidStatistics(reason.into())
}

pub fn encode_statistics(stats: &ClientStatistics) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u32_le(stats.stats_type());
    buf.put_u32_le(StatsHeader::VERSION_1);
    buf.put_u64_le(stats.event());
    match stats {
        ClientStatistics::Tcp {
            counts,
            basic,
            extra,
            ..
        } => {
            put_counts(&mut buf, counts);
            put_basic(&mut buf, basic);
            put_extra(&mut buf, extra);
        }
        ClientStatistics::Udp { counts, basic, .. } => {
            put_counts(&mut buf, counts);
            put_basic(&mut buf, basic);
        }
    }
    buf.freeze()
}

/// Decodes a statistics blob, checking type, version and exact body size
pub fn decode_statistics(data: &[u8]) -> Result<ClientStatistics, WireError> {
    let mut reader = Reader::new(data);
    let header = StatsHeader {
        stats_type: reader.u32_le().map_err(|_| stats_error("short header"))?,
        version: reader.u32_le().map_err(|_| stats_error("short header"))?,
        event: reader.u64_le().map_err(|_| stats_error("short header"))?,
    };
    if header.version != StatsHeader::VERSION_1 {
        return Err(stats_error(format!("unsupported version {}", header.version)));
    }
    let expected = match header.stats_type {
        StatsHeader::TYPE_TCP => STAT_COUNTS_LEN + BASIC_METADATA_LEN + EXTRA_TCP_METADATA_LEN,
        StatsHeader::TYPE_UDP => STAT_COUNTS_LEN + BASIC_METADATA_LEN,
        other => return Err(stats_error(format!("unknown type {}", other))),
    };
    if reader.remaining() != expected {
        return Err(stats_error(format!(
            "body is {} bytes, expected {}",
            reader.remaining(),
            expected
        )));
    }
    let counts = read_counts(&mut reader)?;
    let basic = read_basic(&mut reader)?;
    if header.stats_type == StatsHeader::TYPE_TCP {
        let extra = read_extra(&mut reader)?;
        Ok(ClientStatistics::Tcp {
            event: header.event,
            counts,
            basic,
            extra,
        })
    } else {
        Ok(ClientStatistics::Udp {
            event: header.event,
            counts,
            basic,
        })
    }
}

fn put_counts(buf: &mut BytesMut, c: &StatCounts) {
    for v in [c.rx_packets, c.rx_bytes, c.tx_packets, c.tx_bytes] {
        buf.put_u64_le(v);
    }
    for v in [
        c.rx_duplicate_bytes,
        c.rx_out_of_order_bytes,
        c.tx_retransmit,
        c.connect_attempts,
        c.connect_successes,
        c.min_rtt,
        c.avg_rtt,
        c.var_rtt,
    ] {
        buf.put_u32_le(v);
    }
    for v in [
        c.cell_rx_bytes,
        c.cell_tx_bytes,
        c.wifi_rx_bytes,
        c.wifi_tx_bytes,
        c.wired_rx_bytes,
        c.wired_tx_bytes,
    ] {
        buf.put_u64_le(v);
    }
}

fn read_counts(r: &mut Reader<'_>) -> Result<StatCounts, WireError> {
    Ok(StatCounts {
        rx_packets: r.u64_le()?,
        rx_bytes: r.u64_le()?,
        tx_packets: r.u64_le()?,
        tx_bytes: r.u64_le()?,
        rx_duplicate_bytes: r.u32_le()?,
        rx_out_of_order_bytes: r.u32_le()?,
        tx_retransmit: r.u32_le()?,
        connect_attempts: r.u32_le()?,
        connect_successes: r.u32_le()?,
        min_rtt: r.u32_le()?,
        avg_rtt: r.u32_le()?,
        var_rtt: r.u32_le()?,
        cell_rx_bytes: r.u64_le()?,
        cell_tx_bytes: r.u64_le()?,
        wifi_rx_bytes: r.u64_le()?,
        wifi_tx_bytes: r.u64_le()?,
        wired_rx_bytes: r.u64_le()?,
        wired_tx_bytes: r.u64_le()?,
    })
}

fn put_basic(buf: &mut BytesMut, b: &BasicMetadata) {
    buf.put_u32_le(b.rcv_buf_size);
    buf.put_u32_le(b.rcv_buf_used);
    buf.put_u64_le(b.eupid);
    buf.put_u32_le(b.epid);
    buf.put_slice(b.vuuid.as_bytes());
    buf.put_u16_le(b.ifnet_properties);
}

fn read_basic(r: &mut Reader<'_>) -> Result<BasicMetadata, WireError> {
    Ok(BasicMetadata {
        rcv_buf_size: r.u32_le()?,
        rcv_buf_used: r.u32_le()?,
        eupid: r.u64_le()?,
        epid: r.u32_le()?,
        vuuid: r.uuid()?,
        ifnet_properties: r.u16_le()?,
    })
}

fn put_extra(buf: &mut BytesMut, e: &ExtraTcpMetadata) {
    buf.put_u32_le(e.probe_status.bits());
    for v in [
        e.snd_buf_size,
        e.snd_buf_used,
        e.tx_unacked,
        e.tx_window,
        e.tx_cwindow,
        e.traffic_mgt_flags,
        e.cc_alg_index,
        e.state,
    ] {
        buf.put_u32_le(v);
    }
}

fn read_extra(r: &mut Reader<'_>) -> Result<ExtraTcpMetadata, WireError> {
    Ok(ExtraTcpMetadata {
        probe_status: TcpProbeStatus::from_bits_truncate(r.u32_le()?),
        snd_buf_size: r.u32_le()?,
        snd_buf_used: r.u32_le()?,
        tx_unacked: r.u32_le()?,
        tx_window: r.u32_le()?,
        tx_cwindow: r.u32_le()?,
        traffic_mgt_flags: r.u32_le()?,
        cc_alg_index: r.u32_le()?,
        state: r.u32_le()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::TLV_NIL;
    use core_types::{NetAgentUse, RoutingParameter};

    #[test]
    fn test_parameters_decode() {
        let params = vec![
            ClientParameter::Domain("www.apple.com".into()),
            ClientParameter::RemoteAddress("17.1.2.3:443".parse().unwrap()),
            ClientParameter::RequireInterfaceType(FunctionalType::WifiInfra),
            ClientParameter::PreferAgentType(AgentType::new("com.example", "VPN")),
            ClientParameter::RemoteEndpoint(Endpoint::Name {
                name: "www.apple.com".into(),
                port: 443,
                endpoint_type: 1,
            }),
        ];
        assert_eq!(decode_parameters(&encode_parameters(&params).unwrap()), Ok(params));
    }

    #[test]
    fn test_custom_parameters_skipped() {
        let mut buf = BytesMut::new();
        encode_tlvs(
            &[Tlv::u32(250, 1), parameter_tlv(&ClientParameter::Uid(501)).unwrap()],
            &mut buf,
        );
        assert_eq!(decode_parameters(&buf), Ok(vec![ClientParameter::Uid(501)]));
    }

    #[test]
    fn test_nil_ends_parameter_list() {
        let mut buf = BytesMut::new();
        encode_tlvs(
            &[
                parameter_tlv(&ClientParameter::Domain("apple.com".into())).unwrap(),
                Tlv::empty(TLV_NIL),
                parameter_tlv(&ClientParameter::Uid(0)).unwrap(),
            ],
            &mut buf,
        );
        assert_eq!(
            decode_parameters(&buf),
            Ok(vec![ClientParameter::Domain("apple.com".into())])
        );
    }

    #[test]
    fn test_address_parameter_trailing_bytes() {
        let remote = ClientParameter::RemoteAddress("17.1.2.3:443".parse().unwrap());
        let mut value = parameter_tlv(&remote).unwrap().value.to_vec();
        value.extend_from_slice(&[1, 2, 3]);
        let mut buf = BytesMut::new();
        encode_tlvs(&[Tlv::new(remote.code(), value)], &mut buf);
        assert!(matches!(
            decode_parameters(&buf),
            Err(WireError::InvalidTlv { .. })
        ));
    }

    #[test]
    fn test_endpoint_name_length_limit() {
        let endpoint = |len: usize| {
            ClientParameter::RemoteEndpoint(Endpoint::Name {
                name: "a".repeat(len),
                port: 443,
                endpoint_type: 1,
            })
        };
        let longest = encode_parameters(&[endpoint(MAX_ENDPOINT_NAME_LEN)]).unwrap();
        // TLV header, then the endpoint length byte
        assert_eq!(longest[5], u8::MAX);
        assert_eq!(longest.len(), 5 + u8::MAX as usize);
        assert_eq!(
            decode_parameters(&longest),
            Ok(vec![endpoint(MAX_ENDPOINT_NAME_LEN)])
        );
        assert!(matches!(
            encode_parameters(&[endpoint(MAX_ENDPOINT_NAME_LEN + 1)]),
            Err(WireError::InvalidTlv { .. })
        ));
    }

    #[test]
    fn test_malformed_parameter() {
        let mut buf = BytesMut::new();
        encode_tlvs(
            &[Tlv::new(ClientParameter::CODE_APPLICATION, vec![0u8; 3])],
            &mut buf,
        );
        assert!(decode_parameters(&buf).is_err());
    }

    #[test]
    fn test_client_result_view() {
        let mut result = AggregateResult::pass();
        result.routing_result = ResultKind::IpTunnel;
        result.routing_parameter = RoutingParameter::InterfaceIndex(7);
        result.routed_interface_index = 7;
        result.flags = ClientResultFlags::HAS_IPV4;
        result.push_netagent(NetAgentUse {
            uuid: Uuid::new_v4(),
            generation: 2,
            flags: 0,
        });
        let nexus = NexusInstance {
            instance: Uuid::new_v4(),
            port: 9,
        };
        let view = ClientResultView::new(ClientId::new(), &result, Some(3), Some(nexus));
        let decoded = ClientResultView::decode(&view.encode()).unwrap();
        assert_eq!(decoded, view);
        assert_eq!(decoded.routing_kind(), Some(ResultKind::IpTunnel));
        assert_eq!(decoded.interface, Some((3, 7)));
    }

    #[test]
    fn test_client_list_layout() {
        let ids = vec![ClientId::new(), ClientId::new()];
        let bytes = encode_client_list(&ids);
        assert_eq!(bytes.len(), 4 + 32);
        assert_eq!(&bytes[..4], &[2, 0, 0, 0]);
        assert_eq!(decode_client_list(&bytes), Ok(ids));
    }

    #[test]
    fn test_interface_details_size() {
        let details = InterfaceDetails::new("en0", 4, FunctionalType::Wired).with_ipv6(true);
        let bytes = encode_interface_details(&details);
        assert_eq!(bytes.len(), INTERFACE_DETAILS_LEN);
        assert_eq!(decode_interface_details(&bytes), Ok(details));
    }

    #[test]
    fn test_netagent_size() {
        let agent = NetAgentInfo::new(Uuid::new_v4(), "com.example", "VPN");
        let bytes = encode_netagent(&agent);
        assert_eq!(bytes.len(), NETAGENT_LEN);
        assert_eq!(decode_netagent(&bytes), Ok(agent));
    }

    #[test]
    fn test_statistics_sizes() {
        let udp = ClientStatistics::Udp {
            event: 1,
            counts: StatCounts::default(),
            basic: BasicMetadata::default(),
        };
        let bytes = encode_statistics(&udp);
        assert_eq!(bytes.len(), STATS_HEADER_LEN + 112 + 38);
        assert_eq!(decode_statistics(&bytes), Ok(udp));
    }

    #[test]
    fn test_statistics_rejects_bad_version() {
        let tcp = ClientStatistics::Tcp {
            event: 0,
            counts: StatCounts::default(),
            basic: BasicMetadata::default(),
            extra: ExtraTcpMetadata::default(),
        };
        let mut bytes = encode_statistics(&tcp).to_vec();
        assert_eq!(bytes.len(), STATS_HEADER_LEN + 112 + 38 + 36);
        bytes[4] = 2;
        assert!(matches!(
            decode_statistics(&bytes),
            Err(WireError::InvalidStatistics(_))
        ));
    }

    #[test]
    fn test_statistics_rejects_short_body() {
        let mut bytes = encode_statistics(&ClientStatistics::Udp {
            event: 0,
            counts: StatCounts::default(),
            basic: BasicMetadata::default(),
        })
        .to_vec();
        bytes.pop();
        assert!(decode_statistics(&bytes).is_err());
        bytes[0] = 9;
        assert!(decode_statistics(&bytes).is_err());
    }
}
