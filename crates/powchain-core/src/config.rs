use crate::constants::*;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Tunables for mining and intake.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Leading zero hex digits required of a block's trial hash.
    pub difficulty: u32,
    pub mining_reward: f64,
    /// Reserved sender of reward transactions; bypasses signature and balance checks.
    pub mining_sender: String,
    pub mining_interval: Duration,
    pub parallel_mining: bool,
    pub neighbors: NeighborConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: MINING_DIFFICULTY,
            mining_reward: MINING_REWARD,
            mining_sender: MINING_SENDER.to_string(),
            mining_interval: Duration::from_secs(MINING_TIMER_SECS),
            parallel_mining: true,
            neighbors: NeighborConfig::default(),
        }
    }
}

/// Where to look for neighbors and how often.
#[derive(Debug, Clone)]
pub struct NeighborConfig {
    pub host: Ipv4Addr,
    /// Offsets added to the last octet of `host`.
    pub ip_range: RangeInclusive<u8>,
    pub port_range: RangeInclusive<u16>,
    pub sync_interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::LOCALHOST,
            ip_range: NEIGHBOR_IP_RANGE_START..=NEIGHBOR_IP_RANGE_END,
            port_range: BLOCKCHAIN_PORT_RANGE_START..=BLOCKCHAIN_PORT_RANGE_END,
            sync_interval: Duration::from_secs(NEIGHBOR_SYNC_SECS),
            probe_timeout: Duration::from_millis(NEIGHBOR_PROBE_TIMEOUT_MILLIS),
        }
    }
}
