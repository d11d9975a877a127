pub const HASH_SIZE: usize = 32;
pub const PUBLIC_KEY_SIZE: usize = 64;
pub const SIGNATURE_SIZE: usize = 64;

pub const MINING_DIFFICULTY: u32 = 3;
/// A hash has this many hex digits, so no larger difficulty can be met.
pub const MAX_MINING_DIFFICULTY: u32 = (HASH_SIZE * 2) as u32;
pub const MINING_SENDER: &str = "THE BLOCKCHAIN";
pub const MINING_REWARD: f64 = 1.0;
pub const MINING_TIMER_SECS: u64 = 20;

pub const BLOCKCHAIN_PORT_RANGE_START: u16 = 5001;
pub const BLOCKCHAIN_PORT_RANGE_END: u16 = 5004;
pub const NEIGHBOR_IP_RANGE_START: u8 = 0;
pub const NEIGHBOR_IP_RANGE_END: u8 = 1;
pub const NEIGHBOR_SYNC_SECS: u64 = 20;
pub const NEIGHBOR_PROBE_TIMEOUT_MILLIS: u64 = 1_000;
