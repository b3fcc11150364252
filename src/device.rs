use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{BlockKey, Result};

pub use self::{mem::MemDisk, tracing::TracingAdapter};

mod mem;
mod tracing;

/// The device underneath a buffer cache.
///
/// This is responsible for only two things: reading and writing complete blocks.
/// All caching and locking is handled by the buffer cache. Both calls are
/// synchronous; the calling thread is suspended until the transfer completes.
pub trait Adapter {
    /// Fill `buf` with the contents of block `key`. `buf` is exactly one block long.
    fn read(&self, key: BlockKey, buf: &mut [u8]) -> Result<()>;

    /// Persist `buf` as the contents of block `key`.
    fn write(&self, key: BlockKey, buf: &[u8]) -> Result<()>;
}

impl<A> Adapter for Arc<A>
where
    A: Adapter + ?Sized,
{
    fn read(&self, key: BlockKey, buf: &mut [u8]) -> Result<()> {
        (**self).read(key, buf)
    }

    fn write(&self, key: BlockKey, buf: &[u8]) -> Result<()> {
        (**self).write(key, buf)
    }
}

/// A fresh in-memory disk, traced under a unique `mem.N` id.
pub fn memory(block_size: usize) -> Arc<dyn Adapter + Send + Sync> {
    static MEM_ID: AtomicUsize = AtomicUsize::new(0);
    let mem = MemDisk::new(block_size);
    let id = format!("mem.{}", MEM_ID.fetch_add(1, Ordering::Relaxed));
    Arc::new(TracingAdapter::new(mem, id))
}
