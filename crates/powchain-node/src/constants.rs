pub(crate) const DEFAULT_PORT: u16 = 5001;
pub(crate) const PEER_REQUEST_TIMEOUT_SECS: u64 = 5;
