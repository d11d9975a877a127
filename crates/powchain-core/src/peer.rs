//! Neighbor discovery and the transport the ledger talks to neighbors through.

use crate::config::NeighborConfig;
use crate::error::PeerError;
use crate::{Block, TransactionRequest};
use futures::future::join_all;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::debug;

/// Signals a node sends its neighbors after committing a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    /// The sender sealed its pool; receivers drop theirs.
    ClearPool,
    /// The sender grew its chain; receivers run conflict resolution.
    NewBlock,
}

/// Outbound calls to a single neighbor. Each call is independent; an error
/// concerns that neighbor only.
pub trait PeerTransport: Send + Sync + 'static {
    /// The identifier the node at `peer` reports for itself. One node may be
    /// reachable under several addresses; the id tells them apart.
    fn node_id(&self, peer: SocketAddr) -> impl Future<Output = Result<String, PeerError>> + Send;

    fn fetch_chain(
        &self,
        peer: SocketAddr,
    ) -> impl Future<Output = Result<Vec<Block>, PeerError>> + Send;

    fn notify(
        &self,
        peer: SocketAddr,
        event: PeerEvent,
    ) -> impl Future<Output = Result<(), PeerError>> + Send;

    fn relay_transaction(
        &self,
        peer: SocketAddr,
        request: &TransactionRequest,
    ) -> impl Future<Output = Result<(), PeerError>> + Send;
}

/// The current neighbor set, rebuilt by probing a fixed address grid.
#[derive(Debug)]
pub struct PeerDirectory {
    config: NeighborConfig,
    self_port: u16,
    neighbors: RwLock<Vec<SocketAddr>>,
}

impl PeerDirectory {
    pub fn new(config: NeighborConfig, self_port: u16) -> Self {
        Self {
            config,
            self_port,
            neighbors: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &NeighborConfig {
        &self.config
    }

    /// Every `host+offset:port` in the configured ranges except this node.
    pub fn candidates(&self) -> Vec<SocketAddr> {
        let me = SocketAddr::V4(SocketAddrV4::new(self.config.host, self.self_port));
        let [a, b, c, d] = self.config.host.octets();
        let mut out = Vec::new();
        for port in self.config.port_range.clone() {
            for offset in self.config.ip_range.clone() {
                let Some(last) = d.checked_add(offset) else {
                    continue;
                };
                let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(a, b, c, last), port));
                if addr != me {
                    out.push(addr);
                }
            }
        }
        out
    }

    /// Candidates accepting TCP connections, tried concurrently.
    ///
    /// A reachable address may still be this node or a duplicate of another
    /// neighbor; the ledger weeds those out before calling [`set_neighbors`].
    ///
    /// [`set_neighbors`]: PeerDirectory::set_neighbors
    pub async fn reachable(&self) -> Vec<SocketAddr> {
        let candidates = self.candidates();
        let probe_timeout = self.config.probe_timeout;
        let reachable = join_all(candidates.iter().map(|addr| connects(*addr, probe_timeout))).await;
        let found: Vec<SocketAddr> = candidates
            .into_iter()
            .zip(reachable)
            .filter_map(|(addr, up)| up.then_some(addr))
            .collect();
        debug!(reachable = ?found, "candidates scanned");
        found
    }

    pub async fn neighbors(&self) -> Vec<SocketAddr> {
        self.neighbors.read().await.clone()
    }

    /// Replace the set. The lock is held only for the swap.
    pub async fn set_neighbors(&self, neighbors: Vec<SocketAddr>) {
        *self.neighbors.write().await = neighbors;
    }
}

async fn connects(addr: SocketAddr, limit: std::time::Duration) -> bool {
    matches!(timeout(limit, TcpStream::connect(addr)).await, Ok(Ok(_)))
}
