//! Batch ingestion of peer-supplied blocks
//!
//! Blocks are fed through the acceptance state machine one at a time in
//! arrival order. Children may arrive before their parents; those land in the
//! orphan pool. After the initial pass the orphan pool is swept repeatedly
//! until a full pass attaches nothing, and fork-choice runs once at the end.

use crate::blockchain::{Block, BlockStatus, ChainForkManager, Reorg};
use crate::error::ChainError;
use tracing::{debug, info};

/// Outcome of one `sync` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Per-block status, in arrival order.
    pub statuses: Vec<BlockStatus>,
    /// Blocks placed on a branch during this call, including orphans that
    /// were waiting for one of them.
    pub attached: u64,
    /// Orphans attached by the fixed-point sweep.
    pub reattached: usize,
    /// Number of sweeps, including the final one that attached nothing.
    pub passes: usize,
    pub reorg: Option<Reorg>,
    /// Blocks still waiting for a parent once the sweep settled.
    pub unresolved: Vec<ChainError>,
}

impl SyncReport {
    pub fn accepted(&self) -> usize {
        self.statuses.iter().filter(|s| s.is_attached()).count()
    }

    pub fn rejected(&self) -> Vec<&ChainError> {
        self.statuses
            .iter()
            .filter_map(|s| match s {
                BlockStatus::Rejected(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn duplicates(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| matches!(s, BlockStatus::Duplicate))
            .count()
    }
}

impl ChainForkManager {
    /// Ingest `blocks` in the order given. A rejected block never aborts the
    /// batch.
    pub fn sync<I>(&mut self, blocks: I) -> SyncReport
    where
        I: IntoIterator<Item = Block>,
    {
        let mut report = SyncReport::default();
        let accepted_before = self.stats().accepted;
        for block in blocks {
            let status = self.process_new_block(block);
            report.statuses.push(status);
        }

        loop {
            report.passes += 1;
            let attached = self.reattach_ready_orphans();
            if attached == 0 {
                break;
            }
            debug!(pass = report.passes, attached, "orphan sweep attached blocks");
            report.reattached += attached;
        }

        report.attached = self.stats().accepted - accepted_before;
        report.reorg = self.apply_fork_choice();
        report.unresolved = self.unresolved_orphans();

        info!(
            received = report.statuses.len(),
            attached = report.attached,
            rejected = report.rejected().len(),
            unresolved = report.unresolved.len(),
            height = self.height(),
            "sync complete"
        );
        report
    }
}
