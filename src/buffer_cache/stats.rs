use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how the cache has been used since it was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups satisfied by a slot already holding the block.
    pub hits: u64,
    /// Lookups that had to give a slot a new identity.
    pub misses: u64,
    /// Misses served by recycling a free slot of the block's own bucket.
    pub evictions: u64,
    /// Misses served by taking a free slot from another bucket.
    pub steals: u64,
    /// Blocks read from the adapter.
    pub reads: u64,
    /// Blocks written to the adapter.
    pub writes: u64,
}

#[derive(Debug, Default)]
pub(super) struct Counters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub steals: AtomicU64,
    pub reads: AtomicU64,
    pub writes: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);

        CacheStats {
            hits: get(&self.hits),
            misses: get(&self.misses),
            evictions: get(&self.evictions),
            steals: get(&self.steals),
            reads: get(&self.reads),
            writes: get(&self.writes),
        }
    }
}
