use powchain_core::{
    Block, Ledger, LedgerConfig, PeerError, PeerEvent, PeerTransport, TransactionRequest,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};

pub const DIFFICULTY: u32 = 2;

/// In-process network: every node is reachable through the shared registry.
/// `NewBlock` is only recorded so tests decide when reconciliation runs.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    nodes: Arc<Mutex<HashMap<SocketAddr, Weak<Ledger<LocalNetwork>>>>>,
    announced: Arc<Mutex<Vec<(SocketAddr, PeerEvent)>>>,
}

impl LocalNetwork {
    fn node(&self, peer: SocketAddr) -> Result<Arc<Ledger<LocalNetwork>>, PeerError> {
        self.nodes
            .lock()
            .unwrap()
            .get(&peer)
            .and_then(Weak::upgrade)
            .ok_or_else(|| PeerError::Unreachable(peer.to_string(), "no such node".into()))
    }

    pub fn announced(&self) -> Vec<(SocketAddr, PeerEvent)> {
        self.announced.lock().unwrap().clone()
    }

    /// Start a node listening on `port` of the fake host.
    pub fn spawn_node(&self, port: u16, miner: &str) -> Arc<Ledger<LocalNetwork>> {
        let config = LedgerConfig {
            difficulty: DIFFICULTY,
            parallel_mining: false,
            ..LedgerConfig::default()
        };
        let ledger = Arc::new(Ledger::new(miner, port, config, self.clone()));
        self.nodes
            .lock()
            .unwrap()
            .insert(addr(port), Arc::downgrade(&ledger));
        ledger
    }
}

impl PeerTransport for LocalNetwork {
    async fn node_id(&self, peer: SocketAddr) -> Result<String, PeerError> {
        Ok(self.node(peer)?.node_id().to_string())
    }

    async fn fetch_chain(&self, peer: SocketAddr) -> Result<Vec<Block>, PeerError> {
        Ok(self.node(peer)?.chain().await)
    }

    async fn notify(&self, peer: SocketAddr, event: PeerEvent) -> Result<(), PeerError> {
        let node = self.node(peer)?;
        self.announced.lock().unwrap().push((peer, event));
        if event == PeerEvent::ClearPool {
            node.clear_pool().await;
        }
        Ok(())
    }

    async fn relay_transaction(
        &self,
        peer: SocketAddr,
        request: &TransactionRequest,
    ) -> Result<(), PeerError> {
        self.node(peer)?
            .accept_relayed(request.clone())
            .await
            .map_err(|_| PeerError::Status(peer.to_string(), 400))
    }
}

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Make every node a neighbor of every other.
pub async fn mesh(nodes: &[(u16, &Arc<Ledger<LocalNetwork>>)]) {
    for (port, node) in nodes {
        let others = nodes
            .iter()
            .filter(|(other, _)| other != port)
            .map(|(other, _)| addr(*other))
            .collect();
        node.peers().set_neighbors(others).await;
    }
}
