//! Per-flow statistics reported by clients

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Common header of a statistics blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsHeader {
    pub stats_type: u32,
    pub version: u32,
    pub event: u64,
}

impl StatsHeader {
    pub const TYPE_TCP: u32 = 1;
    pub const TYPE_UDP: u32 = 2;
    pub const VERSION_1: u32 = 1;
}

/// Traffic counters shared by every transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatCounts {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_duplicate_bytes: u32,
    pub rx_out_of_order_bytes: u32,
    pub tx_retransmit: u32,
    pub connect_attempts: u32,
    pub connect_successes: u32,
    pub min_rtt: u32,
    pub avg_rtt: u32,
    pub var_rtt: u32,
    pub cell_rx_bytes: u64,
    pub cell_tx_bytes: u64,
    pub wifi_rx_bytes: u64,
    pub wifi_tx_bytes: u64,
    pub wired_rx_bytes: u64,
    pub wired_tx_bytes: u64,
}

/// Socket metadata shared by every transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BasicMetadata {
    pub rcv_buf_size: u32,
    pub rcv_buf_used: u32,
    pub eupid: u64,
    pub epid: u32,
    /// Effective uuid from the voucher
    pub vuuid: Uuid,
    pub ifnet_properties: u16,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct TcpProbeStatus: u32 {
        const PROBE_ACTIVATED = 0x1;
        const WRITE_PROBE_FAILED = 0x2;
        const READ_PROBE_FAILED = 0x4;
        const CONN_PROBE_FAILED = 0x8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtraTcpMetadata {
    pub probe_status: TcpProbeStatus,
    pub snd_buf_size: u32,
    pub snd_buf_used: u32,
    pub tx_unacked: u32,
    pub tx_window: u32,
    pub tx_cwindow: u32,
    pub traffic_mgt_flags: u32,
    pub cc_alg_index: u32,
    pub state: u32,
}

/// Typed statistics of one flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatistics {
    Tcp {
        event: u64,
        counts: StatCounts,
        basic: BasicMetadata,
        extra: ExtraTcpMetadata,
    },
    Udp {
        event: u64,
        counts: StatCounts,
        basic: BasicMetadata,
    },
}

impl ClientStatistics {
    pub fn counts(&self) -> &StatCounts {
        match self {
            ClientStatistics::Tcp { counts, .. } | ClientStatistics::Udp { counts, .. } => counts,
        }
    }

    pub fn event(&self) -> u64 {
        match self {
            ClientStatistics::Tcp { event, .. } | ClientStatistics::Udp { event, .. } => *event,
        }
    }

    pub fn stats_type(&self) -> u32 {
        match self {
            ClientStatistics::Tcp { .. } => StatsHeader::TYPE_TCP,
            ClientStatistics::Udp { .. } => StatsHeader::TYPE_UDP,
        }
    }
}
