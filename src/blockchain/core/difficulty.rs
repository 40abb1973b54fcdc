//! Per-branch difficulty retargeting.
//!
//! Difficulty is an integer count of leading zero hex digits. Every
//! `adjustment_interval` blocks (by branch height) the level moves by at most
//! one step depending on how the average block time since the previous
//! adjustment point compares to the target. Each branch is evaluated from its
//! own ancestry, so a fork retargets independently of the main chain.

use super::block::Block;
use crate::config::{DifficultyConfig, MAX_DIFFICULTY_LEVEL};
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct DifficultyOracle {
    params: DifficultyConfig,
}

impl DifficultyOracle {
    pub fn new(params: DifficultyConfig) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DifficultyConfig {
        &self.params
    }

    pub fn is_adjustment_height(&self, height: u64) -> bool {
        height % self.params.adjustment_interval == 0
    }

    /// Expected level for `candidate`, whose parent is `ancestry.last()`.
    ///
    /// `ancestry` runs from genesis through the parent. `None` means the parent
    /// is unknown; the candidate's own claim is trusted until it is known, as
    /// long as it lies within `[min_level, max_level]`.
    pub fn expected_level(&self, ancestry: Option<&[Block]>, candidate: &Block) -> u32 {
        if candidate.is_genesis() {
            return candidate.difficulty;
        }
        let ancestry = match ancestry {
            Some(blocks) if !blocks.is_empty() => blocks,
            _ => return self.clamp_level(candidate.difficulty),
        };

        let interval = self.params.adjustment_interval;
        let height = ancestry.len() as u64;
        let parent_height = height - 1;
        let last_adjustment = (parent_height / interval) * interval;
        let adjustment_block = &ancestry[last_adjustment as usize];

        if !self.is_adjustment_height(height) {
            return adjustment_block.difficulty;
        }

        // height - interval == last_adjustment at an adjustment point.
        let elapsed_ms = candidate
            .timestamp
            .saturating_sub(adjustment_block.timestamp);
        self.retarget(adjustment_block.difficulty, elapsed_ms, interval)
    }

    /// One retarget step over `blocks` blocks that took `elapsed_ms` in total.
    pub fn retarget(&self, level: u32, elapsed_ms: u64, blocks: u64) -> u32 {
        let target_total = self
            .params
            .target_block_time
            .as_millis()
            .saturating_mul(u128::from(blocks));
        let next = match u128::from(elapsed_ms).cmp(&target_total) {
            Ordering::Less => level.saturating_add(1),
            Ordering::Greater => level.saturating_sub(1),
            Ordering::Equal => level,
        };
        self.clamp_level(next)
    }

    fn clamp_level(&self, level: u32) -> u32 {
        let ceiling = self.params.max_level.min(MAX_DIFFICULTY_LEVEL);
        level.clamp(self.params.min_level.min(ceiling), ceiling)
    }
}
