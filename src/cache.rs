//! Caching layer for reconstructed ledger views
//!
//! A confirmed balance view depends only on the ancestry of the block it is
//! built on, and a block hash pins that ancestry, so views are keyed by the
//! parent hash and never need invalidation. Entries are evicted LRU.
use crate::blockchain::{LedgerState, Sha256Hash};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct BalanceCache {
    views: Mutex<LruCache<Sha256Hash, LedgerState>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BalanceCache {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let capacity_nz = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            views: Mutex::new(LruCache::new(capacity_nz)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, parent: &Sha256Hash) -> Option<LedgerState> {
        let found = self.views.lock().get(parent).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn put(&self, parent: Sha256Hash, view: LedgerState) {
        self.views.lock().put(parent, view);
    }

    pub fn clear(&self) {
        self.views.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.views.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.views.lock().cap().get()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for BalanceCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for BalanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}
