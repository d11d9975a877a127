//! The ledger engine: chain, pool, mining and neighbor reconciliation.
//!
//! Lock order is mining lock, then chain, then pool. Only holders of the
//! mining lock remove transactions from the pool or change the chain, so a
//! pool snapshot taken under it stays a prefix of the pool until sealed.
//! No lock is held across a call to a neighbor.

use crate::config::LedgerConfig;
use crate::constants::MAX_MINING_DIFFICULTY;
use crate::error::{LedgerError, PeerError, Rejection};
use crate::identity::{EcdsaVerifier, SignatureVerifier};
use crate::peer::{PeerDirectory, PeerEvent, PeerTransport};
use crate::scheduler::Recurring;
use crate::wire::{SignatureProof, TransactionRequest};
use crate::{chain, pow, Block, Hash, Transaction, TransactionPool};
use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Tasks {
    mining: Option<Recurring>,
    sync: Option<Recurring>,
}

pub struct Ledger<T: PeerTransport> {
    config: LedgerConfig,
    address: String,
    node_id: String,
    chain: RwLock<Vec<Block>>,
    pool: TransactionPool,
    mining: Mutex<()>,
    peers: PeerDirectory,
    transport: T,
    verifier: Box<dyn SignatureVerifier>,
    tasks: Mutex<Tasks>,
}

impl<T: PeerTransport> Ledger<T> {
    /// A ledger holding only the genesis block. `address` receives mining
    /// rewards; `self_port` is excluded from neighbor discovery.
    pub fn new(address: impl Into<String>, self_port: u16, config: LedgerConfig, transport: T) -> Self {
        let peers = PeerDirectory::new(config.neighbors.clone(), self_port);
        Self {
            config,
            address: address.into(),
            node_id: hex::encode(rand::random::<[u8; 16]>()),
            chain: RwLock::new(vec![chain::genesis_block()]),
            pool: TransactionPool::new(),
            mining: Mutex::new(()),
            peers,
            transport,
            verifier: Box::new(EcdsaVerifier),
            tasks: Mutex::new(Tasks::default()),
        }
    }

    pub fn with_verifier(mut self, verifier: impl SignatureVerifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Random per-process identifier, served to neighbors so a node can
    /// recognize itself and duplicates among reachable addresses.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn chain(&self) -> Vec<Block> {
        self.chain.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.chain.read().await.len()
    }

    pub async fn last_block(&self) -> Option<Block> {
        self.chain.read().await.last().cloned()
    }

    /// Hash the next block must link to. An empty chain links to the sentinel.
    pub async fn last_hash(&self) -> Hash {
        self.chain
            .read()
            .await
            .last()
            .map_or_else(chain::sentinel_hash, Block::hash)
    }

    /// Pending transactions. May trail a commit that is in progress.
    pub async fn transaction_pool(&self) -> Vec<Transaction> {
        self.pool.snapshot().await
    }

    pub async fn total_amount(&self, address: &str) -> f64 {
        chain::total_amount(&self.chain.read().await, address)
    }

    /// Decide whether `tx` may enter the pool. Never mutates anything.
    pub async fn validate(
        &self,
        tx: &Transaction,
        proof: Option<&SignatureProof>,
    ) -> Result<(), Rejection> {
        if !tx.amount.is_finite() || tx.amount < 0.0 {
            return Err(Rejection::InvalidAmount(tx.amount));
        }
        if tx.sender == self.config.mining_sender {
            return Ok(());
        }
        let proof = proof.ok_or(Rejection::BadSignature)?;
        if self.verifier.address_of(&proof.public_key).as_deref() != Some(tx.sender.as_str()) {
            return Err(Rejection::KeyMismatch(tx.sender.clone()));
        }
        if !self
            .verifier
            .verify(&proof.public_key, &proof.signature, &tx.hash())
        {
            return Err(Rejection::BadSignature);
        }
        let balance = self.total_amount(&tx.sender).await;
        if balance < tx.amount {
            return Err(Rejection::InsufficientFunds {
                balance,
                amount: tx.amount,
            });
        }
        Ok(())
    }

    /// Validate and append to the pool in arrival order.
    pub async fn add_transaction(
        &self,
        tx: Transaction,
        proof: Option<&SignatureProof>,
    ) -> Result<(), Rejection> {
        if let Err(rejection) = self.validate(&tx, proof).await {
            warn!(sender = %tx.sender, %rejection, "transaction rejected");
            return Err(rejection);
        }
        debug!(sender = %tx.sender, recipient = %tx.recipient, amount = tx.amount, "transaction pooled");
        self.pool.push(tx).await;
        Ok(())
    }

    /// Intake from a client: on acceptance the request is relayed to every neighbor.
    pub async fn create_transaction(&self, request: TransactionRequest) -> Result<(), Rejection> {
        let (tx, proof) = request.clone().into_parts()?;
        self.add_transaction(tx, Some(&proof)).await?;
        self.each_neighbor("relay transaction", |peer| {
            self.transport.relay_transaction(peer, &request)
        })
        .await;
        Ok(())
    }

    /// Intake from a neighbor's relay. Not relayed again.
    pub async fn accept_relayed(&self, request: TransactionRequest) -> Result<(), Rejection> {
        let (tx, proof) = request.into_parts()?;
        self.add_transaction(tx, Some(&proof)).await
    }

    /// Seal the whole pool into a block with the given nonce and link, then
    /// tell neighbors to drop their pools.
    pub async fn create_block(&self, nonce: u64, previous_hash: Hash) -> Block {
        let block = {
            let _mining = self.mining.lock().await;
            let transactions = self.pool.take_all().await;
            self.append(Block::new(nonce, previous_hash, transactions)).await
        };
        self.broadcast(PeerEvent::ClearPool).await;
        block
    }

    async fn append(&self, block: Block) -> Block {
        self.chain.write().await.push(block.clone());
        block
    }

    /// One mining cycle: reward, search, seal, announce.
    ///
    /// The pool is mined even when it holds nothing but the reward.
    pub async fn mine(&self) -> Result<Block, LedgerError> {
        let difficulty = self.config.difficulty;
        if difficulty > MAX_MINING_DIFFICULTY {
            return Err(LedgerError::UnreachableDifficulty(difficulty));
        }
        let block = {
            let _mining = self.mining.lock().await;

            let mut transactions = self.pool.snapshot().await;
            let pending = transactions.len();
            transactions.push(Transaction::new(
                self.config.mining_sender.clone(),
                self.address.clone(),
                self.config.mining_reward,
            ));
            let previous_hash = self.last_hash().await;
            let parallel = self.config.parallel_mining;

            let (nonce, transactions) = tokio::task::spawn_blocking(move || {
                let nonce = if parallel {
                    pow::proof_of_work_parallel(&transactions, &previous_hash, difficulty)
                } else {
                    pow::proof_of_work(&transactions, &previous_hash, difficulty)
                };
                (nonce, transactions)
            })
            .await?;

            // Later arrivals stay pooled for the next block.
            self.pool.drain_front(pending).await;
            self.append(Block::new(nonce, previous_hash, transactions)).await
        };
        info!(
            nonce = block.nonce,
            transactions = block.transactions.len(),
            "mined block {}",
            hex::encode(block.hash())
        );
        self.broadcast(PeerEvent::ClearPool).await;
        self.broadcast(PeerEvent::NewBlock).await;
        Ok(block)
    }

    /// Drop every pending transaction (a neighbor sealed them).
    pub async fn clear_pool(&self) {
        let _mining = self.mining.lock().await;
        self.pool.clear().await;
    }

    /// Adopt the longest valid neighbor chain if it is strictly longer than ours.
    pub async fn resolve_conflicts(&self) -> bool {
        let neighbors = self.peers.neighbors().await;
        let mut max_len = self.len().await;
        let fetched = join_all(
            neighbors
                .iter()
                .map(|peer| self.transport.fetch_chain(*peer)),
        )
        .await;

        let mut longest: Option<Vec<Block>> = None;
        for (peer, result) in neighbors.iter().zip(fetched) {
            match result {
                Ok(candidate)
                    if candidate.len() > max_len
                        && chain::is_valid_chain(&candidate, self.config.difficulty) =>
                {
                    max_len = candidate.len();
                    longest = Some(candidate);
                }
                Ok(candidate) => {
                    debug!(%peer, length = candidate.len(), "neighbor chain not adopted")
                }
                Err(e) => debug!(%peer, error = %e, "neighbor chain unavailable"),
            }
        }

        if let Some(candidate) = longest {
            let _mining = self.mining.lock().await;
            let mut chain = self.chain.write().await;
            // We may have mined past it while fetching.
            if candidate.len() > chain.len() {
                info!(length = candidate.len(), "resolve conflicts: replaced");
                *chain = candidate;
                return true;
            }
        }
        info!("resolve conflicts: not replaced");
        false
    }

    /// Rescan the neighbor grid and keep one address per other node.
    pub async fn sync_neighbors(&self) -> Vec<SocketAddr> {
        let reachable = self.peers.reachable().await;
        let found = self.distinct_nodes(reachable).await;
        self.peers.set_neighbors(found.clone()).await;
        info!(neighbors = ?found, "neighbors synced");
        found
    }

    /// Drop addresses that lead back to this node or to a node already kept,
    /// and those that do not answer with an id.
    async fn distinct_nodes(&self, candidates: Vec<SocketAddr>) -> Vec<SocketAddr> {
        let ids = join_all(candidates.iter().map(|peer| self.transport.node_id(*peer))).await;
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .zip(ids)
            .filter_map(|(peer, id)| {
                let id = match id {
                    Ok(id) => id,
                    Err(e) => {
                        debug!(%peer, error = %e, "not a ledger node");
                        return None;
                    }
                };
                if id == self.node_id {
                    debug!(%peer, "address leads back to this node");
                    None
                } else if !seen.insert(id) {
                    debug!(%peer, "node already known under another address");
                    None
                } else {
                    Some(peer)
                }
            })
            .collect()
    }

    async fn broadcast(&self, event: PeerEvent) {
        self.each_neighbor("notify", |peer| self.transport.notify(peer, event))
            .await;
    }

    async fn each_neighbor<F, Fut>(&self, what: &str, call: F)
    where
        F: Fn(SocketAddr) -> Fut,
        Fut: Future<Output = Result<(), PeerError>>,
    {
        let neighbors = self.peers.neighbors().await;
        let results = join_all(neighbors.iter().map(|peer| call(*peer))).await;
        for (peer, result) in neighbors.iter().zip(results) {
            if let Err(e) = result {
                debug!(%peer, error = %e, "{} failed", what);
            }
        }
    }

    /// Start the recurring mining cycle; the first cycle runs immediately.
    /// Returns `false` if it was already running.
    pub async fn start_mining(self: &Arc<Self>) -> bool {
        let mut tasks = self.tasks.lock().await;
        if tasks.mining.as_ref().is_some_and(|t| !t.is_stopped()) {
            return false;
        }
        let ledger = Arc::downgrade(self);
        tasks.mining = Some(Recurring::spawn(
            "mining",
            self.config.mining_interval,
            move || {
                let ledger = ledger.upgrade();
                async move {
                    let Some(ledger) = ledger else { return };
                    if let Err(e) = ledger.mine().await {
                        warn!(error = %e, "mining cycle failed");
                    }
                }
            },
        ));
        true
    }

    /// Start the recurring neighbor refresh, first run after one interval.
    pub async fn start_sync(self: &Arc<Self>) -> bool {
        let mut tasks = self.tasks.lock().await;
        if tasks.sync.as_ref().is_some_and(|t| !t.is_stopped()) {
            return false;
        }
        let ledger = Arc::downgrade(self);
        tasks.sync = Some(Recurring::spawn_delayed(
            "neighbor-sync",
            self.peers.config().sync_interval,
            move || {
                let ledger = ledger.upgrade();
                async move {
                    if let Some(ledger) = ledger {
                        ledger.sync_neighbors().await;
                    }
                }
            },
        ));
        true
    }

    /// Boot sequence: find neighbors, catch up with them, then start both loops.
    pub async fn run(self: &Arc<Self>) {
        self.sync_neighbors().await;
        self.resolve_conflicts().await;
        self.start_sync().await;
        self.start_mining().await;
    }

    pub async fn is_mining(&self) -> bool {
        self.tasks
            .lock()
            .await
            .mining
            .as_ref()
            .is_some_and(|t| !t.is_stopped())
    }

    /// Stop both loops, letting a cycle in progress finish.
    pub async fn shutdown(&self) {
        let (mining, sync) = {
            let mut tasks = self.tasks.lock().await;
            (tasks.mining.take(), tasks.sync.take())
        };
        for task in [mining, sync].into_iter().flatten() {
            debug!(task = task.name(), "stopping");
            task.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Wallet;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    const DIFFICULTY: u32 = 2;

    #[derive(Default)]
    struct MockTransport {
        chains: StdMutex<HashMap<SocketAddr, Vec<Block>>>,
        events: StdMutex<Vec<(SocketAddr, PeerEvent)>>,
        relayed: StdMutex<Vec<(SocketAddr, TransactionRequest)>>,
        ids: StdMutex<HashMap<SocketAddr, String>>,
    }

    impl PeerTransport for MockTransport {
        async fn node_id(&self, peer: SocketAddr) -> Result<String, PeerError> {
            self.ids
                .lock()
                .unwrap()
                .get(&peer)
                .cloned()
                .ok_or_else(|| PeerError::Unreachable(peer.to_string(), "refused".into()))
        }

        async fn fetch_chain(&self, peer: SocketAddr) -> Result<Vec<Block>, PeerError> {
            self.chains
                .lock()
                .unwrap()
                .get(&peer)
                .cloned()
                .ok_or_else(|| PeerError::Unreachable(peer.to_string(), "refused".into()))
        }

        async fn notify(&self, peer: SocketAddr, event: PeerEvent) -> Result<(), PeerError> {
            self.events.lock().unwrap().push((peer, event));
            Ok(())
        }

        async fn relay_transaction(
            &self,
            peer: SocketAddr,
            request: &TransactionRequest,
        ) -> Result<(), PeerError> {
            self.relayed.lock().unwrap().push((peer, request.clone()));
            Ok(())
        }
    }

    fn config() -> LedgerConfig {
        LedgerConfig {
            difficulty: DIFFICULTY,
            parallel_mining: false,
            ..LedgerConfig::default()
        }
    }

    fn ledger(address: &str) -> Ledger<MockTransport> {
        Ledger::new(address, 5001, config(), MockTransport::default())
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// Extend `chain` by one properly mined block.
    fn mined_extension(chain: &mut Vec<Block>, txs: Vec<Transaction>) {
        let prev = chain.last().unwrap().hash();
        let nonce = pow::proof_of_work(&txs, &prev, DIFFICULTY);
        chain.push(Block::new(nonce, prev, txs));
    }

    fn reward(to: &str) -> Transaction {
        Transaction::new(crate::constants::MINING_SENDER, to, 1.0)
    }

    #[tokio::test]
    async fn starts_with_genesis_only() {
        let ledger = ledger("miner");
        let chain = ledger.chain().await;
        assert_eq!(chain, vec![chain::genesis_block()]);
        assert_eq!(ledger.last_hash().await, chain::genesis_block().hash());
        assert!(ledger.transaction_pool().await.is_empty());
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let ledger = ledger("miner");
        assert_eq!(ledger.len().await, 1);

        ledger.pool.push(Transaction::new("A", "B", 10.0)).await;
        ledger.mine().await.unwrap();
        assert_eq!(ledger.len().await, 2);
        assert_eq!(ledger.total_amount("B").await, 10.0);
        assert_eq!(ledger.total_amount("A").await, -10.0);

        ledger.pool.push(Transaction::new("C", "D", 2.0)).await;
        ledger.pool.push(Transaction::new("X", "Y", 5.0)).await;
        ledger.mine().await.unwrap();
        assert_eq!(ledger.len().await, 3);
        assert_eq!(ledger.total_amount("C").await, -2.0);
        assert_eq!(ledger.total_amount("D").await, 2.0);
        assert_eq!(ledger.total_amount("miner").await, 2.0);
        assert!(chain::is_valid_chain(&ledger.chain().await, DIFFICULTY));
    }

    #[tokio::test]
    async fn mined_block_keeps_arrival_order_with_reward_last() {
        let ledger = ledger("miner");
        ledger.pool.push(Transaction::new("A", "B", 1.0)).await;
        ledger.pool.push(Transaction::new("C", "D", 2.0)).await;
        let block = ledger.mine().await.unwrap();
        let senders: Vec<&str> = block.transactions.iter().map(|t| t.sender.as_str()).collect();
        assert_eq!(senders, vec!["A", "C", crate::constants::MINING_SENDER]);
        assert_eq!(block.transactions[2].recipient, "miner");
        assert!(ledger.transaction_pool().await.is_empty());
    }

    #[tokio::test]
    async fn mining_an_empty_pool_issues_reward() {
        let ledger = ledger("miner");
        let block = ledger.mine().await.unwrap();
        assert_eq!(block.transactions, vec![reward("miner")]);
        assert_eq!(ledger.total_amount("miner").await, 1.0);
    }

    #[tokio::test]
    async fn parallel_mining_produces_valid_chain() {
        let config = LedgerConfig {
            difficulty: DIFFICULTY,
            parallel_mining: true,
            ..LedgerConfig::default()
        };
        let ledger = Ledger::new("miner", 5001, config, MockTransport::default());
        ledger.mine().await.unwrap();
        ledger.mine().await.unwrap();
        assert!(chain::is_valid_chain(&ledger.chain().await, DIFFICULTY));
    }

    #[tokio::test]
    async fn create_block_seals_pool_contents() {
        let ledger = ledger("miner");
        ledger.pool.push(Transaction::new("A", "B", 1.0)).await;
        ledger.pool.push(Transaction::new("B", "C", 0.5)).await;
        let before = ledger.transaction_pool().await;

        let prev = ledger.last_hash().await;
        let nonce = pow::proof_of_work(&before, &prev, DIFFICULTY);
        let block = ledger.create_block(nonce, prev).await;

        assert_eq!(block.transactions, before);
        assert!(ledger.transaction_pool().await.is_empty());
        assert_eq!(ledger.chain().await.last(), Some(&block));
    }

    #[tokio::test]
    async fn create_block_chains_stay_valid() {
        let ledger = ledger("miner");
        for i in 0..4 {
            ledger.pool.push(Transaction::new("A", "B", i as f64)).await;
            let pending = ledger.transaction_pool().await;
            let prev = ledger.last_hash().await;
            let nonce = pow::proof_of_work(&pending, &prev, DIFFICULTY);
            ledger.create_block(nonce, prev).await;
        }
        assert_eq!(ledger.len().await, 5);
        assert!(chain::is_valid_chain(&ledger.chain().await, DIFFICULTY));
    }

    #[tokio::test]
    async fn signed_transfer_is_accepted_and_relayed() {
        let wallet = Wallet::generate();
        let ledger = ledger(wallet.address());
        ledger.peers.set_neighbors(vec![peer(6001), peer(6002)]).await;
        ledger.mine().await.unwrap();
        ledger.mine().await.unwrap();

        let request = wallet.transfer("bob", 1.5).unwrap();
        ledger.create_transaction(request.clone()).await.unwrap();

        assert_eq!(
            ledger.transaction_pool().await,
            vec![Transaction::new(wallet.address(), "bob", 1.5)]
        );
        let relayed = ledger.transport.relayed.lock().unwrap().clone();
        assert_eq!(relayed, vec![(peer(6001), request.clone()), (peer(6002), request)]);
    }

    #[tokio::test]
    async fn relayed_transaction_is_not_relayed_again() {
        let wallet = Wallet::generate();
        let ledger = ledger(wallet.address());
        ledger.peers.set_neighbors(vec![peer(6001)]).await;
        ledger.mine().await.unwrap();

        ledger
            .accept_relayed(wallet.transfer("bob", 0.5).unwrap())
            .await
            .unwrap();
        assert_eq!(ledger.transaction_pool().await.len(), 1);
        assert!(ledger.transport.relayed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let wallet = Wallet::generate();
        let ledger = ledger(wallet.address());
        ledger.mine().await.unwrap();

        let mut request = wallet.transfer("bob", 0.5).unwrap();
        let mut sig = hex::decode(request.signature.as_deref().unwrap()).unwrap();
        sig[10] ^= 0x01;
        request.signature = Some(hex::encode(sig));

        let before = ledger.transaction_pool().await.len();
        assert_eq!(
            ledger.create_transaction(request).await,
            Err(Rejection::BadSignature)
        );
        assert_eq!(ledger.transaction_pool().await.len(), before);
    }

    #[tokio::test]
    async fn insufficient_balance_is_rejected() {
        let wallet = Wallet::generate();
        let ledger = ledger("someone-else");
        assert_eq!(ledger.total_amount(wallet.address()).await, 0.0);

        let result = ledger.create_transaction(wallet.transfer("bob", 5.0).unwrap()).await;
        assert_eq!(
            result,
            Err(Rejection::InsufficientFunds {
                balance: 0.0,
                amount: 5.0
            })
        );
        assert!(ledger.transaction_pool().await.is_empty());
    }

    #[tokio::test]
    async fn pooled_funds_do_not_count_toward_balance() {
        let wallet = Wallet::generate();
        let ledger = ledger("miner");
        ledger
            .add_transaction(Transaction::new(crate::constants::MINING_SENDER, wallet.address(), 3.0), None)
            .await
            .unwrap();
        let result = ledger.create_transaction(wallet.transfer("bob", 1.0).unwrap()).await;
        assert!(matches!(result, Err(Rejection::InsufficientFunds { .. })));
    }

    #[tokio::test]
    async fn key_must_belong_to_sender() {
        let owner = Wallet::generate();
        let thief = Wallet::generate();
        let ledger = ledger(owner.address());
        ledger.mine().await.unwrap();

        // Valid signature, but by a key that does not derive to the sender.
        let tx = Transaction::new(owner.address(), "thief", 1.0);
        let proof = SignatureProof {
            public_key: thief.public_key_hex(),
            signature: thief.sign(&tx).unwrap(),
        };
        assert_eq!(
            ledger.add_transaction(tx, Some(&proof)).await,
            Err(Rejection::KeyMismatch(owner.address().to_string()))
        );
    }

    #[tokio::test]
    async fn negative_and_missing_inputs_are_rejected() {
        let wallet = Wallet::generate();
        let ledger = ledger(wallet.address());
        ledger.mine().await.unwrap();

        let negative = ledger.create_transaction(wallet.transfer("bob", -1.0).unwrap()).await;
        assert_eq!(negative, Err(Rejection::InvalidAmount(-1.0)));

        let mut missing = wallet.transfer("bob", 0.1).unwrap();
        missing.sender_public_key = None;
        assert_eq!(
            ledger.create_transaction(missing).await,
            Err(Rejection::MissingField("sender_public_key"))
        );

        let unsigned = Transaction::new(wallet.address(), "bob", 0.1);
        assert_eq!(
            ledger.add_transaction(unsigned, None).await,
            Err(Rejection::BadSignature)
        );
        assert!(ledger.transaction_pool().await.is_empty());
    }

    #[tokio::test]
    async fn system_sender_bypasses_checks() {
        let ledger = ledger("miner");
        ledger
            .add_transaction(Transaction::new(crate::constants::MINING_SENDER, "anyone", 50.0), None)
            .await
            .unwrap();
        assert_eq!(ledger.transaction_pool().await.len(), 1);
    }

    #[tokio::test]
    async fn mining_announces_clear_pool_then_new_block() {
        let ledger = ledger("miner");
        ledger.peers.set_neighbors(vec![peer(6001), peer(6002)]).await;
        ledger.mine().await.unwrap();
        let events = ledger.transport.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (peer(6001), PeerEvent::ClearPool),
                (peer(6002), PeerEvent::ClearPool),
                (peer(6001), PeerEvent::NewBlock),
                (peer(6002), PeerEvent::NewBlock),
            ]
        );
    }

    #[tokio::test]
    async fn create_block_announces_clear_pool() {
        let ledger = ledger("miner");
        ledger.peers.set_neighbors(vec![peer(6001)]).await;
        let prev = ledger.last_hash().await;
        ledger.create_block(pow::proof_of_work(&[], &prev, DIFFICULTY), prev).await;
        let events = ledger.transport.events.lock().unwrap().clone();
        assert_eq!(events, vec![(peer(6001), PeerEvent::ClearPool)]);
    }

    #[tokio::test]
    async fn clear_pool_empties_pending() {
        let ledger = ledger("miner");
        ledger.pool.push(Transaction::new("A", "B", 1.0)).await;
        ledger.clear_pool().await;
        assert!(ledger.transaction_pool().await.is_empty());
    }

    #[tokio::test]
    async fn equal_length_chain_is_not_adopted() {
        let ledger = ledger("miner");
        ledger.mine().await.unwrap();

        let mut theirs = vec![chain::genesis_block()];
        mined_extension(&mut theirs, vec![reward("other")]);
        assert!(chain::is_valid_chain(&theirs, DIFFICULTY));
        ledger.transport.chains.lock().unwrap().insert(peer(6001), theirs);
        ledger.peers.set_neighbors(vec![peer(6001)]).await;

        let ours = ledger.chain().await;
        assert!(!ledger.resolve_conflicts().await);
        assert_eq!(ledger.chain().await, ours);
    }

    #[tokio::test]
    async fn longer_valid_chain_is_adopted() {
        let ledger = ledger("miner");
        ledger.mine().await.unwrap();

        let mut theirs = vec![chain::genesis_block()];
        mined_extension(&mut theirs, vec![reward("other")]);
        mined_extension(&mut theirs, vec![reward("other")]);
        ledger.transport.chains.lock().unwrap().insert(peer(6001), theirs.clone());
        ledger.peers.set_neighbors(vec![peer(6001)]).await;

        assert!(ledger.resolve_conflicts().await);
        assert_eq!(ledger.chain().await, theirs);
        assert_eq!(ledger.total_amount("miner").await, 0.0);
        assert_eq!(ledger.total_amount("other").await, 2.0);
    }

    #[tokio::test]
    async fn longest_of_several_wins() {
        let ledger = ledger("miner");
        let mut short = vec![chain::genesis_block()];
        mined_extension(&mut short, vec![reward("short")]);
        let mut long = short.clone();
        mined_extension(&mut long, vec![reward("long")]);
        mined_extension(&mut long, vec![reward("long")]);
        {
            let mut chains = ledger.transport.chains.lock().unwrap();
            chains.insert(peer(6001), short);
            chains.insert(peer(6002), long.clone());
        }
        ledger.peers.set_neighbors(vec![peer(6001), peer(6002)]).await;

        assert!(ledger.resolve_conflicts().await);
        assert_eq!(ledger.chain().await, long);
    }

    #[tokio::test]
    async fn longer_invalid_chain_is_ignored() {
        let ledger = ledger("miner");
        let mut forged = vec![chain::genesis_block()];
        mined_extension(&mut forged, vec![reward("forger")]);
        mined_extension(&mut forged, vec![reward("forger")]);
        forged[1].transactions[0].amount = 1_000_000.0;
        ledger.transport.chains.lock().unwrap().insert(peer(6001), forged);
        ledger.peers.set_neighbors(vec![peer(6001)]).await;

        assert!(!ledger.resolve_conflicts().await);
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn unreachable_neighbors_are_skipped() {
        let ledger = ledger("miner");
        let mut theirs = vec![chain::genesis_block()];
        mined_extension(&mut theirs, vec![reward("other")]);
        ledger.transport.chains.lock().unwrap().insert(peer(6002), theirs.clone());
        // 6001 and 6003 have no chain registered and fail to fetch.
        ledger
            .peers
            .set_neighbors(vec![peer(6001), peer(6002), peer(6003)])
            .await;

        assert!(ledger.resolve_conflicts().await);
        assert_eq!(ledger.chain().await, theirs);
    }

    #[tokio::test]
    async fn own_address_and_aliases_are_not_neighbors() {
        let ledger = ledger("miner");
        let own = ledger.node_id().to_string();
        {
            let mut ids = ledger.transport.ids.lock().unwrap();
            ids.insert(peer(6001), own);
            ids.insert(peer(6002), "other".into());
            ids.insert(SocketAddr::from(([127, 0, 0, 2], 6002)), "other".into());
            ids.insert(peer(6004), "third".into());
        }
        // 6003 answers the TCP connect but is not a ledger node.
        let candidates = vec![
            peer(6001),
            peer(6002),
            SocketAddr::from(([127, 0, 0, 2], 6002)),
            peer(6003),
            peer(6004),
        ];

        let found = ledger.distinct_nodes(candidates).await;
        assert_eq!(found, vec![peer(6002), peer(6004)]);
    }

    #[tokio::test]
    async fn node_ids_differ_between_ledgers() {
        assert_ne!(ledger("a").node_id(), ledger("a").node_id());
    }

    #[tokio::test]
    async fn unreachable_difficulty_is_refused_without_locking() {
        let config = LedgerConfig {
            difficulty: MAX_MINING_DIFFICULTY + 1,
            ..config()
        };
        let ledger = Ledger::new("miner", 5001, config, MockTransport::default());
        ledger.pool.push(Transaction::new("A", "B", 1.0)).await;

        let err = ledger.mine().await.unwrap_err();
        assert!(matches!(err, LedgerError::UnreachableDifficulty(65)));
        assert_eq!(ledger.len().await, 1);
        assert_eq!(ledger.transaction_pool().await.len(), 1);

        tokio::time::timeout(Duration::from_secs(1), ledger.clear_pool())
            .await
            .unwrap();
        assert!(ledger.transaction_pool().await.is_empty());
    }

    #[tokio::test]
    async fn no_neighbors_means_no_change() {
        let ledger = ledger("miner");
        assert!(!ledger.resolve_conflicts().await);
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_intake_is_never_lost_or_duplicated() {
        let ledger = Arc::new(Ledger::new("miner", 5001, config(), MockTransport::default()));

        let writer = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                for i in 0..200u32 {
                    let tx = Transaction::new(
                        crate::constants::MINING_SENDER,
                        format!("user{i}"),
                        1.0,
                    );
                    ledger.add_transaction(tx, None).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        let miner = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                for _ in 0..5 {
                    ledger.mine().await.unwrap();
                }
            })
        };
        writer.await.unwrap();
        miner.await.unwrap();
        ledger.mine().await.unwrap();

        let chain = ledger.chain().await;
        assert!(chain::is_valid_chain(&chain, DIFFICULTY));
        assert!(ledger.transaction_pool().await.is_empty());
        for i in 0..200u32 {
            let user = format!("user{i}");
            let hits = chain
                .iter()
                .flat_map(|b| &b.transactions)
                .filter(|t| t.recipient == user)
                .count();
            assert_eq!(hits, 1, "{user} sealed {hits} times");
        }
    }

    #[tokio::test]
    async fn balances_are_conserved() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let ledger = ledger(alice.address());

        ledger.mine().await.unwrap();
        ledger.mine().await.unwrap();
        ledger.create_transaction(alice.transfer(bob.address(), 1.5).unwrap()).await.unwrap();
        ledger.mine().await.unwrap();
        ledger.create_transaction(bob.transfer("carol", 0.5).unwrap()).await.unwrap();
        ledger.mine().await.unwrap();

        let chain = ledger.chain().await;
        let sender = &ledger.config().mining_sender;
        let mut addresses: Vec<&str> = chain
            .iter()
            .flat_map(|b| &b.transactions)
            .flat_map(|t| [t.sender.as_str(), t.recipient.as_str()])
            .filter(|a| *a != sender.as_str())
            .collect();
        addresses.sort();
        addresses.dedup();

        let mut total = 0.0;
        for address in addresses {
            total += ledger.total_amount(address).await;
        }
        let issued: f64 = chain
            .iter()
            .flat_map(|b| &b.transactions)
            .filter(|t| &t.sender == sender)
            .map(|t| t.amount)
            .sum();
        assert_eq!(issued, 4.0);
        assert_eq!(total, issued);
        assert_eq!(ledger.total_amount("carol").await, 0.5);
        assert_eq!(ledger.total_amount(bob.address()).await, 1.0);
    }

    #[tokio::test]
    async fn mining_loop_runs_and_stops() {
        let config = LedgerConfig {
            difficulty: 1,
            parallel_mining: false,
            mining_interval: Duration::from_secs(3600),
            ..LedgerConfig::default()
        };
        let ledger = Arc::new(Ledger::new("miner", 5001, config, MockTransport::default()));
        assert!(ledger.start_mining().await);
        assert!(!ledger.start_mining().await);
        assert!(ledger.is_mining().await);

        for _ in 0..500 {
            if ledger.len().await >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ledger.len().await, 2);

        ledger.shutdown().await;
        assert!(!ledger.is_mining().await);
        assert!(ledger.start_mining().await);
        ledger.shutdown().await;
    }
}
