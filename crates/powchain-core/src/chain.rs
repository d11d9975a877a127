use crate::{pow, Block, Hash};

/// Hash of the all-zero, transaction-free block that precedes genesis.
pub fn sentinel_hash() -> Hash {
    Block::default().hash()
}

/// Genesis points at the sentinel and carries timestamp `0`, so every node
/// starts from the same root.
pub fn genesis_block() -> Block {
    Block {
        nonce: 0,
        previous_hash: sentinel_hash(),
        timestamp: 0,
        transactions: vec![],
    }
}

/// Checks hash linkage and proof of work from index 1 onward. The genesis
/// block is taken as given.
pub fn is_valid_chain(chain: &[Block], difficulty: u32) -> bool {
    if chain.is_empty() {
        return false;
    }
    chain.windows(2).all(|pair| {
        let (prev, block) = (&pair[0], &pair[1]);
        block.previous_hash == prev.hash()
            && pow::valid_proof(
                block.nonce,
                &block.previous_hash,
                &block.transactions,
                difficulty,
            )
    })
}

/// Net amount received by `address` over every confirmed transaction.
pub fn total_amount(chain: &[Block], address: &str) -> f64 {
    chain
        .iter()
        .flat_map(|b| b.transactions.iter())
        .fold(0.0, |mut total, tx| {
            if tx.recipient == address {
                total += tx.amount;
            }
            if tx.sender == address {
                total -= tx.amount;
            }
            total
        })
}
