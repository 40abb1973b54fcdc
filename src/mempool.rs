//! Pending transaction pool
//!
//! The chain engine only sees transactions through [`TransactionPool`]; the
//! [`Mempool`] here is the reference implementation used by the miner node.

use crate::blockchain::{Block, LedgerState, Sha256Hash};
use crate::config::MempoolConfig;
use crate::error::ChainError;
use crate::transaction::Transaction;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Source of transactions for block templates.
pub trait TransactionPool {
    /// Pick up to `max_count` transactions that `confirmed` can pay for,
    /// in the order they should appear in the block.
    fn select(&self, confirmed: &LedgerState, max_count: usize) -> Vec<Transaction>;

    /// Forget transactions that made it into an accepted block.
    fn remove(&mut self, included: &[Transaction]);
}

#[derive(Debug, Clone)]
struct PoolEntry {
    arrival: u64,
    tx: Transaction,
}

/// Bounded, fee-ordered transaction pool.
#[derive(Debug, Clone)]
pub struct Mempool {
    transactions: HashMap<Sha256Hash, PoolEntry>,
    max_transactions: usize,
    next_arrival: u64,
}

impl Mempool {
    pub fn new(config: &MempoolConfig) -> Self {
        Mempool {
            transactions: HashMap::new(),
            max_transactions: config.max_transactions,
            next_arrival: 0,
        }
    }

    /// Add a transaction after structural validation.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        tx.validate_structure()?;

        let tx_hash = tx.hash();
        if self.transactions.contains_key(&tx_hash) {
            return Err(ChainError::InvalidTransaction(
                "Transaction already in mempool".to_string(),
            ));
        }
        if self.transactions.len() >= self.max_transactions {
            return Err(ChainError::MempoolFull);
        }

        let arrival = self.next_arrival;
        self.next_arrival += 1;
        debug!(tx = %tx.hash_str(), fee = tx.fee, "transaction added to mempool");
        self.transactions.insert(tx_hash, PoolEntry { arrival, tx });
        Ok(())
    }

    pub fn get_transaction(&self, tx_hash: &Sha256Hash) -> Option<&Transaction> {
        self.transactions.get(tx_hash).map(|entry| &entry.tx)
    }

    pub fn remove_transaction(&mut self, tx_hash: &Sha256Hash) -> Option<Transaction> {
        self.transactions.remove(tx_hash).map(|entry| entry.tx)
    }

    /// All pending transactions, highest fee first, ties in arrival order.
    pub fn get_transactions_by_fee(&self) -> Vec<Transaction> {
        let mut entries: Vec<&PoolEntry> = self.transactions.values().collect();
        entries.sort_unstable_by(|a, b| b.tx.fee.cmp(&a.tx.fee).then(a.arrival.cmp(&b.arrival)));
        entries.into_iter().map(|entry| entry.tx.clone()).collect()
    }

    /// Drop every pending transaction already carried by a block of `chain`.
    /// Returns how many were removed.
    pub fn prune_included(&mut self, chain: &[Block]) -> usize {
        let included: HashSet<Sha256Hash> = chain
            .iter()
            .flat_map(|block| block.transactions().iter().map(Transaction::hash))
            .collect();
        let before = self.transactions.len();
        self.transactions.retain(|hash, _| !included.contains(hash));
        before - self.transactions.len()
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(&MempoolConfig::default())
    }
}

impl TransactionPool for Mempool {
    fn select(&self, confirmed: &LedgerState, max_count: usize) -> Vec<Transaction> {
        let mut running = confirmed.clone();
        let mut selected = Vec::new();
        for tx in self.get_transactions_by_fee() {
            if selected.len() >= max_count {
                break;
            }
            // Skip anything the running balance cannot cover; a cheaper
            // transaction from the same sender may still fit.
            if tx.validate(&mut running).is_ok() {
                selected.push(tx);
            }
        }
        selected
    }

    fn remove(&mut self, included: &[Transaction]) {
        for tx in included {
            self.transactions.remove(&tx.hash());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(address: &str, balance: u64) -> LedgerState {
        let mut state = LedgerState::new();
        state.credit(address, balance);
        state
    }

    #[test]
    fn test_duplicate_transaction_is_rejected() {
        let mut pool = Mempool::default();
        let tx = Transaction::new("alice", "bob", 5, 1);
        pool.add_transaction(tx.clone()).unwrap();
        assert!(matches!(
            pool.add_transaction(tx),
            Err(ChainError::InvalidTransaction(_))
        ));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_structurally_invalid_transaction_is_rejected() {
        let mut pool = Mempool::default();
        assert!(pool.add_transaction(Transaction::new("", "bob", 5, 1)).is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pool_is_bounded() {
        let mut pool = Mempool::new(&MempoolConfig { max_transactions: 2 });
        pool.add_transaction(Transaction::new("a", "b", 1, 0)).unwrap();
        pool.add_transaction(Transaction::new("a", "b", 2, 0)).unwrap();
        assert_eq!(
            pool.add_transaction(Transaction::new("a", "b", 3, 0)),
            Err(ChainError::MempoolFull)
        );
    }

    #[test]
    fn test_fee_order_with_arrival_tiebreak() {
        let mut pool = Mempool::default();
        let low = Transaction::new("a", "b", 1, 1);
        let first_high = Transaction::new("c", "d", 1, 5);
        let second_high = Transaction::new("e", "f", 1, 5);
        pool.add_transaction(low.clone()).unwrap();
        pool.add_transaction(first_high.clone()).unwrap();
        pool.add_transaction(second_high.clone()).unwrap();

        assert_eq!(pool.get_transactions_by_fee(), vec![first_high, second_high, low]);
    }

    #[test]
    fn test_select_skips_uncovered_transactions() {
        let mut pool = Mempool::default();
        let big = Transaction::new("alice", "bob", 8, 3);
        let small = Transaction::new("alice", "carol", 4, 1);
        let unfunded = Transaction::new("mallory", "bob", 1, 2);
        pool.add_transaction(big.clone()).unwrap();
        pool.add_transaction(small.clone()).unwrap();
        pool.add_transaction(unfunded).unwrap();

        // Alice holds 10: the 11-unit spend is skipped, the 5-unit one fits.
        let selected = pool.select(&funded("alice", 10), 10);
        assert_eq!(selected, vec![small]);

        let selected = pool.select(&funded("alice", 20), 10);
        assert_eq!(selected, vec![big.clone(), Transaction::new("alice", "carol", 4, 1)]);

        let selected = pool.select(&funded("alice", 20), 1);
        assert_eq!(selected, vec![big]);
    }

    #[test]
    fn test_remove_and_prune_included() {
        let mut pool = Mempool::default();
        let a = Transaction::new("alice", "bob", 1, 0);
        let b = Transaction::new("alice", "carol", 1, 0);
        pool.add_transaction(a.clone()).unwrap();
        pool.add_transaction(b.clone()).unwrap();

        pool.remove(&[a.clone()]);
        assert_eq!(pool.len(), 1);

        let block = Block::new(
            crate::blockchain::BlockData::Transactions(vec![b.clone()]),
            [7u8; 32],
            1,
            "miner",
            50,
        );
        assert_eq!(pool.prune_included(&[block]), 1);
        assert!(pool.get_transaction(&b.hash()).is_none());
    }
}
