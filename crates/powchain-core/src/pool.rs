use crate::Transaction;
use tokio::sync::Mutex;

/// Pending transactions in arrival order.
///
/// Every method holds the inner lock for a single operation only. Callers that
/// remove transactions (`drain_front`, `clear`) must hold the ledger's mining
/// lock so a snapshot taken for mining is still a prefix when it is sealed.
#[derive(Debug, Default)]
pub struct TransactionPool {
    txs: Mutex<Vec<Transaction>>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, tx: Transaction) {
        self.txs.lock().await.push(tx);
    }

    pub async fn snapshot(&self) -> Vec<Transaction> {
        self.txs.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.txs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.txs.lock().await.is_empty()
    }

    /// Remove and return the first `count` transactions, keeping later arrivals.
    pub async fn drain_front(&self, count: usize) -> Vec<Transaction> {
        let mut txs = self.txs.lock().await;
        let count = count.min(txs.len());
        txs.drain(..count).collect()
    }

    pub async fn take_all(&self) -> Vec<Transaction> {
        std::mem::take(&mut *self.txs.lock().await)
    }

    pub async fn clear(&self) {
        self.txs.lock().await.clear();
    }
}
