use crate::config::ChainConfig;
use crate::error::ChainError;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::block::{Block, Sha256Hash};
use super::difficulty::DifficultyOracle;
use super::state::{LedgerState, LedgerValidator};
use super::validation::{validate_block, ValidationContext};

/// Outcome of feeding one block through the acceptance state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStatus {
    Rejected(ChainError),
    Duplicate,
    AppendedToMain,
    NewFork,
    AppendedToFork,
    Orphaned,
}

impl BlockStatus {
    /// True when the block now sits on the main chain or a fork.
    pub fn is_attached(&self) -> bool {
        matches!(
            self,
            BlockStatus::AppendedToMain | BlockStatus::NewFork | BlockStatus::AppendedToFork
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            BlockStatus::Rejected(_) => "rejected",
            BlockStatus::Duplicate => "duplicate",
            BlockStatus::AppendedToMain => "appended-to-main",
            BlockStatus::NewFork => "new-fork",
            BlockStatus::AppendedToFork => "appended-to-fork",
            BlockStatus::Orphaned => "orphaned",
        }
    }
}

/// A fork overtaking the main chain.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Reorg {
    pub old_tip: String,
    pub new_tip: String,
    /// Height of the last block both branches share.
    pub fork_height: u64,
    pub old_length: usize,
    pub new_length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChainStats {
    pub accepted: u64,
    pub rejected: u64,
    pub duplicates: u64,
    pub orphaned: u64,
    pub reattached: u64,
    pub purged: u64,
    pub reorgs: u64,
    pub forks_pruned: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChainSummary {
    pub height: u64,
    pub tip: String,
    pub tip_difficulty: u32,
    pub forks: usize,
    pub orphans: usize,
    pub stats: ChainStats,
}

/// Owns the canonical chain, the alternative forks and the orphan pool.
///
/// Every fork is stored as a full block sequence starting at genesis. Blocks
/// are validated once on arrival and again when they leave the orphan pool,
/// because only then is the branch that decides their difficulty and ledger
/// known.
pub struct ChainForkManager {
    config: ChainConfig,
    main: Vec<Block>,
    forks: Vec<Vec<Block>>,
    orphans: HashMap<Sha256Hash, Block>,
    oracle: DifficultyOracle,
    ledger: LedgerValidator,
    stats: ChainStats,
}

impl ChainForkManager {
    pub fn new(config: ChainConfig) -> Result<Self, ChainError> {
        config.validate()?;
        let deadline = Instant::now() + config.genesis.mining_timeout;
        let genesis = Block::genesis(
            &config.genesis,
            config.difficulty.initial_level,
            config.mining.cancel_check_interval,
            || Instant::now() >= deadline,
        )?;
        info!(
            hash = %genesis.hash_hex(),
            level = genesis.difficulty,
            "chain initialised from genesis"
        );

        Ok(ChainForkManager {
            oracle: DifficultyOracle::new(config.difficulty.clone()),
            ledger: LedgerValidator::new(&config.ledger),
            main: vec![genesis],
            forks: Vec::new(),
            orphans: HashMap::new(),
            stats: ChainStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn oracle(&self) -> &DifficultyOracle {
        &self.oracle
    }

    pub fn ledger(&self) -> &LedgerValidator {
        &self.ledger
    }

    pub fn genesis(&self) -> &Block {
        &self.main[0]
    }

    pub fn main_chain(&self) -> &[Block] {
        &self.main
    }

    pub fn tip(&self) -> &Block {
        &self.main[self.main.len() - 1]
    }

    pub fn height(&self) -> u64 {
        (self.main.len() - 1) as u64
    }

    pub fn forks(&self) -> &[Vec<Block>] {
        &self.forks
    }

    pub fn orphans(&self) -> &HashMap<Sha256Hash, Block> {
        &self.orphans
    }

    pub fn stats(&self) -> &ChainStats {
        &self.stats
    }

    pub fn summary(&self) -> ChainSummary {
        ChainSummary {
            height: self.height(),
            tip: self.tip().hash_hex(),
            tip_difficulty: self.tip().difficulty,
            forks: self.forks.len(),
            orphans: self.orphans.len(),
            stats: self.stats.clone(),
        }
    }

    /// Known anywhere: main chain, a fork, or the orphan pool.
    pub fn contains_block(&self, hash: &Sha256Hash) -> bool {
        position(&self.main, hash).is_some()
            || self.forks.iter().any(|f| position(f, hash).is_some())
            || self.orphans.contains_key(hash)
    }

    /// The branch prefix from genesis through `hash`, if any branch holds it.
    pub fn ancestry(&self, hash: &Sha256Hash) -> Option<&[Block]> {
        if let Some(pos) = position(&self.main, hash) {
            return Some(&self.main[..=pos]);
        }
        self.forks
            .iter()
            .find_map(|fork| position(fork, hash).map(|pos| &fork[..=pos]))
    }

    /// Difficulty the oracle demands for `block` on its parent's branch.
    pub fn expected_difficulty(&self, block: &Block) -> u32 {
        self.oracle
            .expected_level(self.ancestry(&block.previous_hash), block)
    }

    /// Spendable balances for a child of `hash`.
    pub fn confirmed_view_at(&self, hash: &Sha256Hash) -> Option<LedgerState> {
        self.ancestry(hash)
            .map(|ancestry| self.ledger.confirmed_state(ancestry))
    }

    pub fn confirmed_view_at_tip(&self) -> LedgerState {
        self.ledger.confirmed_state(&self.main)
    }

    pub fn validate(&self, block: &Block) -> Result<(), ChainError> {
        let ctx = ValidationContext {
            ancestry: self.ancestry(&block.previous_hash),
            genesis_hash: self.genesis().hash,
            block_reward: self.config.ledger.block_reward,
            oracle: &self.oracle,
            ledger: &self.ledger,
        };
        validate_block(block, &ctx)
    }

    /// Validate and place a block. Does not run fork-choice.
    pub fn process_new_block(&mut self, block: Block) -> BlockStatus {
        let hash = block.hash;
        if let Err(e) = self.validate(&block) {
            warn!(hash = %hex::encode(hash), error = %e, "rejected block");
            self.stats.rejected += 1;
            return BlockStatus::Rejected(e);
        }

        if self.contains_block(&hash) {
            debug!(hash = %hex::encode(hash), "duplicate block ignored");
            self.stats.duplicates += 1;
            return BlockStatus::Duplicate;
        }

        let status = self.place(block);
        match &status {
            BlockStatus::Orphaned => self.stats.orphaned += 1,
            _ if status.is_attached() => {
                self.stats.accepted += 1;
                self.reattach_orphans(hash);
            }
            _ => {}
        }
        status
    }

    /// `process_new_block` followed by fork-choice. Used for single blocks,
    /// including the ones this node mines itself.
    pub fn submit_block(&mut self, block: Block) -> BlockStatus {
        let status = self.process_new_block(block);
        if status.is_attached() {
            self.apply_fork_choice();
        }
        status
    }

    fn place(&mut self, block: Block) -> BlockStatus {
        let parent = block.previous_hash;

        if self.tip().hash == parent {
            debug!(hash = %block.hash_hex(), height = self.main.len(), "appended to main chain");
            self.main.push(block);
            return BlockStatus::AppendedToMain;
        }

        if let Some(pos) = position(&self.main, &parent) {
            info!(hash = %block.hash_hex(), fork_height = pos, "new fork off the main chain");
            let mut fork = self.main[..=pos].to_vec();
            fork.push(block);
            self.forks.push(fork);
            return BlockStatus::NewFork;
        }

        if let Some(fork) = self
            .forks
            .iter_mut()
            .find(|f| f.last().map(|b| b.hash) == Some(parent))
        {
            debug!(hash = %block.hash_hex(), height = fork.len(), "appended to fork");
            fork.push(block);
            return BlockStatus::AppendedToFork;
        }

        let branched = self
            .forks
            .iter()
            .find_map(|f| position(f, &parent).map(|pos| f[..=pos].to_vec()));
        if let Some(mut fork) = branched {
            info!(hash = %block.hash_hex(), fork_height = fork.len() - 1, "new fork off a fork");
            fork.push(block);
            self.forks.push(fork);
            return BlockStatus::NewFork;
        }

        debug!(
            hash = %block.hash_hex(),
            parent = %hex::encode(parent),
            "parent unknown, block queued as orphan"
        );
        self.orphans.insert(block.hash, block);
        BlockStatus::Orphaned
    }

    /// Remove every orphan whose parent is `parent`, oldest first.
    fn take_orphans_of(&mut self, parent: &Sha256Hash) -> Vec<Block> {
        let mut children: Vec<(u64, Sha256Hash)> = self
            .orphans
            .values()
            .filter(|b| &b.previous_hash == parent)
            .map(|b| (b.timestamp, b.hash))
            .collect();
        children.sort();
        children
            .into_iter()
            .filter_map(|(_, hash)| self.orphans.remove(&hash))
            .collect()
    }

    /// Revalidate a block leaving the orphan pool and place it, or purge it.
    fn adopt_orphan(&mut self, block: Block) -> bool {
        let hash = block.hash;
        if let Err(e) = self.validate(&block) {
            warn!(hash = %hex::encode(hash), error = %e, "purged invalid orphan");
            self.stats.purged += 1;
            return false;
        }
        let status = self.place(block);
        if status.is_attached() {
            info!(hash = %hex::encode(hash), status = status.label(), "orphan reattached");
            self.stats.accepted += 1;
            self.stats.reattached += 1;
            true
        } else {
            false
        }
    }

    /// Attach every orphan that descends from `attached`, walking an explicit
    /// worklist instead of recursing. Returns how many were attached.
    fn reattach_orphans(&mut self, attached: Sha256Hash) -> usize {
        let mut worklist = vec![attached];
        let mut count = 0;
        while let Some(parent) = worklist.pop() {
            for child in self.take_orphans_of(&parent) {
                let child_hash = child.hash;
                if self.adopt_orphan(child) {
                    count += 1;
                    worklist.push(child_hash);
                }
            }
        }
        count
    }

    /// One pass over the orphan pool attaching every orphan whose parent is
    /// now on some branch. Returns how many blocks were attached.
    pub(crate) fn reattach_ready_orphans(&mut self) -> usize {
        let mut ready: Vec<(u64, Sha256Hash)> = self
            .orphans
            .values()
            .filter(|b| self.ancestry(&b.previous_hash).is_some())
            .map(|b| (b.timestamp, b.hash))
            .collect();
        ready.sort();

        let mut count = 0;
        for (_, hash) in ready {
            // May already have been adopted through an earlier worklist.
            let Some(block) = self.orphans.remove(&hash) else {
                continue;
            };
            if self.adopt_orphan(block) {
                count += 1 + self.reattach_orphans(hash);
            }
        }
        count
    }

    /// Longest branch wins; ties keep the current main chain, and among
    /// forks of equal length the earliest one wins.
    pub fn apply_fork_choice(&mut self) -> Option<Reorg> {
        let mut best: Option<usize> = None;
        let mut best_len = self.main.len();
        for (idx, fork) in self.forks.iter().enumerate() {
            if fork.len() > best_len {
                best = Some(idx);
                best_len = fork.len();
            }
        }

        let reorg = best.map(|idx| {
            let old_tip = self.tip().hash_hex();
            let old_length = self.main.len();
            std::mem::swap(&mut self.main, &mut self.forks[idx]);
            let shared = common_prefix_len(&self.main, &self.forks[idx]);
            let reorg = Reorg {
                old_tip,
                new_tip: self.tip().hash_hex(),
                fork_height: shared.saturating_sub(1) as u64,
                old_length,
                new_length: self.main.len(),
            };
            info!(
                old_tip = %reorg.old_tip,
                new_tip = %reorg.new_tip,
                fork_height = reorg.fork_height,
                "reorganised onto longer fork"
            );
            self.stats.reorgs += 1;
            reorg
        });

        self.prune_forks();
        reorg
    }

    fn prune_forks(&mut self) {
        let Some(depth) = self.config.forks.retention_depth else {
            return;
        };
        let main_len = self.main.len() as u64;
        let before = self.forks.len();
        self.forks
            .retain(|fork| fork.len() as u64 + depth >= main_len);
        let pruned = before - self.forks.len();
        if pruned > 0 {
            debug!(pruned, "dropped forks beyond retention depth");
            self.stats.forks_pruned += pruned as u64;
        }
    }

    /// One `OrphanUnresolvable` per block still waiting for its parent.
    pub fn unresolved_orphans(&self) -> Vec<ChainError> {
        let mut waiting: Vec<&Block> = self.orphans.values().collect();
        waiting.sort_by_key(|b| (b.timestamp, b.hash));
        waiting
            .into_iter()
            .map(|b| ChainError::OrphanUnresolvable {
                block: b.hash_hex(),
                parent: hex::encode(b.previous_hash),
            })
            .collect()
    }
}

fn position(branch: &[Block], hash: &Sha256Hash) -> Option<usize> {
    branch.iter().rposition(|b| &b.hash == hash)
}

fn common_prefix_len(a: &[Block], b: &[Block]) -> usize {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x.hash == y.hash)
        .count()
}
