use crate::cache::BalanceCache;
use crate::config::LedgerConfig;
use crate::error::ChainError;
use crate::transaction::{Address, Transaction};
use std::collections::HashMap;

use super::block::Block;

/// Spendable balances per address.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LedgerState {
    pub address_balances: HashMap<Address, u64>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_balance(&self, address: &str) -> u64 {
        self.address_balances.get(address).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, address: &str, amount: u64) {
        if amount == 0 {
            return;
        }
        let balance = self.address_balances.entry(address.to_string()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn debit(&mut self, address: &str, amount: u64) {
        let balance = self.address_balances.entry(address.to_string()).or_insert(0);
        if *balance < amount {
            tracing::warn!(
                address,
                balance = *balance,
                amount,
                "debit exceeds reconstructed balance; clamping to zero"
            );
        }
        *balance = balance.saturating_sub(amount);
    }

    /// Credit the miner reward and every receiver and fee of `block`.
    fn apply_credits(&mut self, block: &Block) {
        self.credit(&block.miner_address, block.block_reward);
        for tx in block.transactions() {
            self.credit(&tx.receiver, tx.amount);
            self.credit(&block.miner_address, tx.fee);
        }
    }

    fn apply_debits(&mut self, block: &Block) {
        for tx in block.transactions() {
            self.debit(&tx.sender, tx.amount.saturating_add(tx.fee));
        }
    }
}

/// Rebuilds spendable balances for a branch and guards candidate blocks
/// against spending more than their senders hold.
///
/// A block counts only once `confirmation_depth` blocks sit on top of it;
/// genesis is spendable immediately. A confirmed block applies all of its
/// effects, an unconfirmed one applies none unless `debit_unconfirmed` is set,
/// in which case its sender debits apply right away.
#[derive(Debug)]
pub struct LedgerValidator {
    confirmation_depth: u64,
    debit_unconfirmed: bool,
    cache: BalanceCache,
}

impl LedgerValidator {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            confirmation_depth: config.confirmation_depth,
            debit_unconfirmed: config.debit_unconfirmed,
            cache: BalanceCache::new(config.balance_cache_size),
        }
    }

    pub fn confirmation_depth(&self) -> u64 {
        self.confirmation_depth
    }

    pub fn cache(&self) -> &BalanceCache {
        &self.cache
    }

    /// Whether the block at `height` counts for a child of the block at `parent_height`.
    pub fn is_confirmed(&self, height: u64, parent_height: u64) -> bool {
        height == 0 || parent_height.saturating_sub(height) >= self.confirmation_depth
    }

    /// Balances spendable by a block built on top of `ancestry.last()`.
    ///
    /// `ancestry` runs from genesis through the parent.
    pub fn confirmed_state(&self, ancestry: &[Block]) -> LedgerState {
        let parent = match ancestry.last() {
            Some(block) => block,
            None => return LedgerState::new(),
        };
        if let Some(cached) = self.cache.get(&parent.hash) {
            return cached;
        }

        let parent_height = (ancestry.len() - 1) as u64;
        let mut state = LedgerState::new();
        for (height, block) in ancestry.iter().enumerate() {
            if self.is_confirmed(height as u64, parent_height) {
                state.apply_credits(block);
                state.apply_debits(block);
            } else if self.debit_unconfirmed {
                state.apply_debits(block);
            }
        }

        self.cache.put(parent.hash, state.clone());
        state
    }

    /// Replay `transactions` in order against a copy of the confirmed view.
    /// The first sender unable to cover `amount + fee` invalidates the batch.
    pub fn check_transactions(
        &self,
        ancestry: &[Block],
        transactions: &[Transaction],
    ) -> Result<LedgerState, ChainError> {
        let mut running = self.confirmed_state(ancestry);
        for tx in transactions {
            tx.validate(&mut running)?;
        }
        Ok(running)
    }

    pub fn validate_block(&self, ancestry: &[Block], block: &Block) -> Result<(), ChainError> {
        self.check_transactions(ancestry, block.transactions())
            .map(|_| ())
    }
}
