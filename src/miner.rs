//! Block template assembly and proof-of-work search
//!
//! Mined blocks are submitted through [`ChainForkManager::submit_block`], the
//! same acceptance path a peer block takes; the miner never writes to the
//! chain directly.

use crate::blockchain::{Block, BlockData, BlockStatus, ChainForkManager};
use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::mempool::TransactionPool;
use crate::transaction::Address;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Cooperative stop signal for a nonce search: a shared flag plus an
/// optional deadline. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token sharing this flag that also expires after `limit`. An earlier
    /// existing deadline is kept.
    pub fn with_deadline(&self, limit: Duration) -> Self {
        let candidate = Instant::now() + limit;
        let deadline = match self.deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        CancelToken {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }
}

/// An unmined candidate and the level its branch demands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningTemplate {
    pub block: Block,
    pub target_level: u32,
}

#[derive(Debug, Clone)]
pub struct MiningEngine {
    miner_address: Address,
    block_reward: u64,
    max_block_transactions: usize,
    check_interval: u64,
    max_duration: Option<Duration>,
}

impl MiningEngine {
    pub fn new(config: &ChainConfig) -> Self {
        MiningEngine {
            miner_address: config.mining.miner_address.clone(),
            block_reward: config.ledger.block_reward,
            max_block_transactions: config.mining.max_block_transactions,
            check_interval: config.mining.cancel_check_interval,
            max_duration: config.mining.max_duration,
        }
    }

    pub fn with_miner_address(mut self, address: impl Into<Address>) -> Self {
        self.miner_address = address.into();
        self
    }

    pub fn miner_address(&self) -> &str {
        &self.miner_address
    }

    /// Assemble a candidate on the current main tip.
    pub fn build_candidate<P>(&self, chain: &ChainForkManager, pool: &P) -> MiningTemplate
    where
        P: TransactionPool + ?Sized,
    {
        let parent = chain.tip();
        let confirmed = chain.confirmed_view_at_tip();
        let transactions = pool.select(&confirmed, self.max_block_transactions);
        let timestamp = now_ms().max(parent.timestamp.saturating_add(1));

        let mut block = Block::new(
            BlockData::Transactions(transactions),
            parent.hash,
            timestamp,
            self.miner_address.clone(),
            self.block_reward,
        );
        let target_level = chain.expected_difficulty(&block);
        block.difficulty = target_level;

        debug!(
            parent = %parent.hash_hex(),
            height = chain.height() + 1,
            level = target_level,
            transactions = block.transactions().len(),
            "built block template"
        );
        MiningTemplate {
            block,
            target_level,
        }
    }

    /// Run the nonce search. Honours `cancel` and the configured time limit.
    pub fn mine(&self, template: MiningTemplate, cancel: &CancelToken) -> Result<Block, ChainError> {
        let cancel = match self.max_duration {
            Some(limit) => cancel.with_deadline(limit),
            None => cancel.clone(),
        };
        let MiningTemplate {
            mut block,
            target_level,
        } = template;

        let started = Instant::now();
        block.mine(target_level, self.check_interval, || cancel.is_cancelled())?;
        info!(
            hash = %block.hash_hex(),
            nonce = block.nonce,
            level = target_level,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "mined block"
        );
        Ok(block)
    }

    /// Build, mine and submit one block. Included transactions leave the
    /// pool once the block is attached.
    pub fn produce<P>(
        &self,
        chain: &mut ChainForkManager,
        pool: &mut P,
        cancel: &CancelToken,
    ) -> Result<(Block, BlockStatus), ChainError>
    where
        P: TransactionPool + ?Sized,
    {
        let template = self.build_candidate(chain, pool);
        let block = self.mine(template, cancel)?;
        let status = chain.submit_block(block.clone());
        match &status {
            BlockStatus::Rejected(e) => return Err(e.clone()),
            status if status.is_attached() => pool.remove(block.transactions()),
            _ => {}
        }
        Ok((block, status))
    }
}

/// Wall clock in unix milliseconds.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
