use std::{num::NonZeroUsize, sync::Arc};

use crate::{device::Adapter, BufferCache, ErrorKind, Result};

/// What to do when every slot in the cache is leased or pinned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Treat it as a provisioning failure and stop.
    #[default]
    Stop,
    /// Suspend the caller until some lease is released.
    Wait,
}

pub struct CacheConfig {
    /// Number of block slots. Fixed for the lifetime of the cache.
    pub capacity: NonZeroUsize,
    /// Number of independently locked buckets the key space is split into.
    pub buckets: NonZeroUsize,
    pub block_size: NonZeroUsize,
    pub exhaustion: ExhaustionPolicy,
    pub adapter: Arc<dyn Adapter + Send + Sync>,
}

impl CacheConfig {
    pub const DEFAULT_CAPACITY: usize = 30;
    pub const DEFAULT_BUCKETS: usize = 13;
    pub const DEFAULT_BLOCK_SIZE: usize = 1024;

    pub fn new(adapter: Arc<dyn Adapter + Send + Sync>) -> Self {
        Self {
            capacity: nonzero(Self::DEFAULT_CAPACITY),
            buckets: nonzero(Self::DEFAULT_BUCKETS),
            block_size: nonzero(Self::DEFAULT_BLOCK_SIZE),
            exhaustion: ExhaustionPolicy::Stop,
            adapter,
        }
    }

    pub fn build(self) -> Result<BufferCache> {
        self.capacity
            .get()
            .checked_mul(self.block_size.get())
            .filter(|&total| total <= isize::MAX as usize)
            .ok_or(ErrorKind::InvalidConfig("slot memory overflows the address space"))?;

        Ok(BufferCache::new(self))
    }
}

fn nonzero(v: usize) -> NonZeroUsize {
    NonZeroUsize::new(v).unwrap_or(NonZeroUsize::MIN)
}
