//! Concurrent block buffer cache.
//!
//! ## Layout
//!
//! The cache owns a fixed array of slots, each big enough for one block, and
//! splits the key space into buckets by `block % buckets`. A bucket has its own
//! lock, a hash chain of the slots holding blocks that map to it, and an LRU ring
//! of those slots that nobody references. A slot is in a ring exactly when its
//! reference count is zero; eviction takes the oldest entry of a ring.
//!
//! ## Locking
//!
//! Two classes of lock are involved:
//!
//! 1. Bucket locks are short: they cover chain and ring updates and identity
//! changes, and are never held across I/O or while waiting on a slot.
//! 2. Each slot has a [SleepLock](crate::sync::SleepLock) over its bytes. A
//! [Buf] holds it, including across adapter transfers. Waiting on it suspends
//! the thread.
//!
//! A lookup that misses and finds its own bucket empty scans the other buckets
//! for a free slot to steal. To stay deadlock free, two bucket locks are only
//! ever held as (higher index, lower index), taken in that order. Reaching a
//! higher bucket means dropping our own lock first, so anything seen before is
//! re-checked once it is retaken.
//!
//! Bucket eviction is approximate LRU; there is no cache-wide order of use.

use std::{
    fmt::Debug,
    iter,
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
    ptr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use cache_padded::CachePadded;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::{
    config::{CacheConfig, ExhaustionPolicy},
    device::Adapter,
    stop,
    sync::{SleepLockGuard, CANCEL_POLL_INTERVAL},
    BlockKey, CancelToken, ErrorKind, Result,
};

pub use self::stats::CacheStats;

use self::{bucket::Bucket, slot::Slot, stats::Counters};

mod bucket;
mod slot;
mod stats;

pub struct BufferCache {
    slots: Arc<[CachePadded<Slot>]>,
    buckets: Box<[CachePadded<Mutex<Bucket>>]>,
    /// Serializes pin count changes.
    pins: Mutex<()>,
    adapter: Arc<dyn Adapter + Send + Sync>,
    block_size: usize,
    exhaustion: ExhaustionPolicy,
    /// Bumped every time a slot becomes free. Only maintained under
    /// [ExhaustionPolicy::Wait].
    freed: AtomicU64,
    freed_lock: Mutex<()>,
    freed_signal: Condvar,
    counters: Counters,
}

/// How a caller is willing to wait for a busy slot.
#[derive(Clone, Copy)]
enum Wait<'c> {
    Block,
    Interruptible(&'c CancelToken),
    Never,
}

impl BufferCache {
    pub(crate) fn new(config: CacheConfig) -> Self {
        let capacity = config.capacity.get();
        let bucket_count = config.buckets.get();
        let block_size = config.block_size.get();

        let slots: Arc<[CachePadded<Slot>]> =
            iter::repeat_with(|| CachePadded::new(Slot::new(block_size)))
                .take(capacity)
                .collect();

        let mut buckets: Vec<Bucket> = iter::repeat_with(|| Bucket::new(slots.clone()))
            .take(bucket_count)
            .collect();
        for i in 0..capacity {
            buckets[i % bucket_count].lru_push_newest(i);
        }

        BufferCache {
            slots,
            buckets: buckets
                .into_iter()
                .map(|b| CachePadded::new(Mutex::new(b)))
                .collect(),
            pins: Mutex::new(()),
            adapter: config.adapter,
            block_size,
            exhaustion: config.exhaustion,
            freed: AtomicU64::new(0),
            freed_lock: Mutex::new(()),
            freed_signal: Condvar::new(),
            counters: Default::default(),
        }
    }

    /// Lease the slot for a block without reading it from the device.
    ///
    /// The returned buffer's exclusivity lock is held; its content is only
    /// meaningful if [Buf::is_valid] says so.
    pub fn acquire(&self, dev: u32, block: u32) -> Result<Buf<'_>> {
        self.acquire_with(BlockKey::new(dev, block), Wait::Block)
    }

    /// Like [acquire()](Self::acquire), but gives up with
    /// [ErrorKind::Interrupted] if `cancel` fires while waiting.
    pub fn acquire_interruptible(
        &self,
        dev: u32,
        block: u32,
        cancel: &CancelToken,
    ) -> Result<Buf<'_>> {
        self.acquire_with(BlockKey::new(dev, block), Wait::Interruptible(cancel))
    }

    /// Lease the slot for a block only if nobody else holds it, failing with
    /// [ErrorKind::LockContended] otherwise.
    ///
    /// Under [ExhaustionPolicy::Wait], a cache with no free slot also fails
    /// with [ErrorKind::LockContended] instead of waiting for one.
    pub fn try_acquire(&self, dev: u32, block: u32) -> Result<Buf<'_>> {
        self.acquire_with(BlockKey::new(dev, block), Wait::Never)
    }

    /// Lease a block with its content loaded from the device.
    pub fn read(&self, dev: u32, block: u32) -> Result<Buf<'_>> {
        self.read_with(BlockKey::new(dev, block), Wait::Block)
    }

    pub fn read_interruptible(
        &self,
        dev: u32,
        block: u32,
        cancel: &CancelToken,
    ) -> Result<Buf<'_>> {
        self.read_with(BlockKey::new(dev, block), Wait::Interruptible(cancel))
    }

    /// Persist the current content of a leased buffer.
    pub fn write(&self, buf: &Buf<'_>) -> Result<()> {
        self.check_lease(buf, "write");

        self.adapter.write(buf.key(), &buf[..])?;
        Counters::bump(&self.counters.writes);
        self.slots[buf.index].set_valid();
        Ok(())
    }

    /// End a lease. Dropping the buffer does the same.
    pub fn release(&self, buf: Buf<'_>) {
        self.check_lease(&buf, "release");
        drop(buf);
    }

    /// Keep a leased block resident after the lease ends, without holding its
    /// lock. Each pin must be undone by one [unpin()](Self::unpin).
    pub fn pin(&self, buf: &Buf<'_>) {
        self.check_lease(buf, "pin");

        let _guard = self.pins.lock();
        let slot = &self.slots[buf.index];
        slot.pin();
        slot.get();
    }

    pub fn unpin(&self, buf: &Buf<'_>) {
        self.check_lease(buf, "unpin");

        let _guard = self.pins.lock();
        let slot = &self.slots[buf.index];
        if slot.pins() == 0 {
            stop(format_args!("unpin: block {} is not pinned", buf.key()));
        }
        slot.unpin();
        // The lease still holds a reference, so this never frees the slot.
        slot.put();
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_with(&self, key: BlockKey, wait: Wait<'_>) -> Result<Buf<'_>> {
        let mut buf = self.acquire_with(key, wait)?;
        if !buf.is_valid() {
            // On failure the lease is dropped and the slot stays invalid, so the
            // next reader retries the transfer.
            self.adapter.read(key, &mut buf[..])?;
            Counters::bump(&self.counters.reads);
            self.slots[buf.index].set_valid();
        }
        Ok(buf)
    }

    fn acquire_with(&self, key: BlockKey, wait: Wait<'_>) -> Result<Buf<'_>> {
        let index = self.claim(key, wait)?;
        let data = &self.slots[index].data;

        let guard = match wait {
            Wait::Block => Ok(data.lock()),
            Wait::Interruptible(cancel) => data.lock_interruptible(cancel),
            Wait::Never => data
                .try_lock()
                .ok_or_else(|| ErrorKind::LockContended.into()),
        };

        match guard {
            Ok(guard) => Ok(Buf {
                cache: self,
                index,
                guard: ManuallyDrop::new(guard),
            }),
            Err(err) => {
                self.unref(index);
                Err(err)
            }
        }
    }

    /// Find or assign the slot for `key` and take a reference to it.
    fn claim(&self, key: BlockKey, wait: Wait<'_>) -> Result<usize> {
        loop {
            let seen = self.freed.load(Ordering::Acquire);
            if let Some(index) = self.lookup(key) {
                return Ok(index);
            }

            match self.exhaustion {
                ExhaustionPolicy::Stop => stop("no free buffers in any bucket"),
                ExhaustionPolicy::Wait => self.wait_for_free(seen, wait)?,
            }
        }
    }

    fn lookup(&self, key: BlockKey) -> Option<usize> {
        let idx = self.bucket_of(key);
        let mut home = self.buckets[idx].lock();

        if let Some(index) = self.hit(&mut home, key) {
            return Some(index);
        }
        if let Some(index) = self.evict(&mut home, key) {
            return Some(index);
        }

        for j in (0..self.buckets.len()).filter(|&j| j != idx) {
            let mut other = if j < idx {
                self.buckets[j].lock()
            } else {
                drop(home);
                let other = self.buckets[j].lock();
                home = self.buckets[idx].lock();

                // Our bucket was unlocked for a moment. Someone may have brought
                // the block in, or released a slot of ours.
                if let Some(index) = self.hit(&mut home, key) {
                    return Some(index);
                }
                if let Some(index) = self.evict(&mut home, key) {
                    return Some(index);
                }
                other
            };

            if let Some(index) = other.lru_pop_oldest() {
                let slot = &self.slots[index];
                if slot.is_assigned() {
                    debug_assert_eq!(self.bucket_of(slot.key()), j);
                    other.remove(index);
                }
                self.assign(&mut home, index, key);
                Counters::bump(&self.counters.steals);
                debug!("stealing slot {} from bucket {} for {}", index, j, key);
                return Some(index);
            }
        }

        None
    }

    fn hit(&self, home: &mut Bucket, key: BlockKey) -> Option<usize> {
        let index = home.find(key)?;
        if self.slots[index].get() == 0 {
            home.lru_remove(index);
        }
        Counters::bump(&self.counters.hits);
        trace!("hit {} in slot {}", key, index);
        Some(index)
    }

    /// Recycle the oldest free slot of the home bucket.
    fn evict(&self, home: &mut Bucket, key: BlockKey) -> Option<usize> {
        let index = home.lru_pop_oldest()?;
        let slot = &self.slots[index];
        if slot.is_assigned() {
            debug!("evicting {} from slot {} for {}", slot.key(), index, key);
            home.remove(index);
        }
        self.assign(home, index, key);
        Counters::bump(&self.counters.evictions);
        Some(index)
    }

    fn assign(&self, home: &mut Bucket, index: usize, key: BlockKey) {
        let slot = &self.slots[index];
        if slot.refcount() != 0 {
            stop(format_args!(
                "slot {} was evictable with {} references",
                index,
                slot.refcount()
            ));
        }
        debug_assert!(!slot.data.is_locked());

        slot.assign(key);
        home.insert(index);
        Counters::bump(&self.counters.misses);
        trace!("miss {}, assigned slot {}", key, index);
    }

    /// Drop a reference taken by [claim()](Self::claim), making the slot
    /// evictable once nobody refers to it.
    fn unref(&self, index: usize) {
        let slot = &self.slots[index];
        let mut bucket = self.buckets[self.bucket_of(slot.key())].lock();
        if slot.put() == 0 {
            bucket.lru_push_newest(index);
            drop(bucket);
            self.signal_free();
        }
    }

    fn signal_free(&self) {
        if self.exhaustion == ExhaustionPolicy::Wait {
            self.freed.fetch_add(1, Ordering::AcqRel);
            let _guard = self.freed_lock.lock();
            self.freed_signal.notify_all();
        }
    }

    /// Suspend until a slot has been freed since `seen` was read.
    fn wait_for_free(&self, seen: u64, wait: Wait<'_>) -> Result<()> {
        debug!("cache exhausted, waiting for a free slot");

        let mut guard = self.freed_lock.lock();
        while self.freed.load(Ordering::Acquire) == seen {
            match wait {
                Wait::Block => self.freed_signal.wait(&mut guard),
                Wait::Interruptible(cancel) => {
                    if cancel.is_cancelled() {
                        return Err(ErrorKind::Interrupted.into());
                    }
                    self.freed_signal
                        .wait_for(&mut guard, CANCEL_POLL_INTERVAL);
                }
                Wait::Never => return Err(ErrorKind::LockContended.into()),
            }
        }
        Ok(())
    }

    fn bucket_of(&self, key: BlockKey) -> usize {
        key.block as usize % self.buckets.len()
    }

    #[track_caller]
    fn check_lease(&self, buf: &Buf<'_>, op: &str) {
        if !ptr::eq(buf.cache, self) {
            stop(format_args!("{}: buffer belongs to another cache", op));
        }
        if !buf.guard.lock().holding() {
            stop(format_args!("{}: buffer lock not held", op));
        }
    }
}

impl Debug for BufferCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCache")
            .field("capacity", &self.capacity())
            .field("buckets", &self.bucket_count())
            .field("block_size", &self.block_size)
            .field("free", &self.buckets.iter().map(|b| b.lock().free()).sum::<usize>())
            .finish_non_exhaustive()
    }
}

/// A leased block: one reference on its slot plus the slot's exclusivity lock.
///
/// Dereferences to the block's bytes. The lease ends when the buffer is dropped
/// or passed to [BufferCache::release]; it must be ended by the thread that took
/// it and should not outlive the operation it was taken for.
pub struct Buf<'a> {
    cache: &'a BufferCache,
    index: usize,
    guard: ManuallyDrop<SleepLockGuard<'a, Box<[u8]>>>,
}

impl<'a> Buf<'a> {
    pub fn key(&self) -> BlockKey {
        self.slot_ref().key()
    }

    /// The index of the slot backing this buffer.
    pub fn slot(&self) -> usize {
        self.index
    }

    pub fn is_valid(&self) -> bool {
        self.slot_ref().is_valid()
    }

    /// References currently held on the slot, this lease and pins included.
    pub fn refcount(&self) -> usize {
        self.slot_ref().refcount()
    }

    pub fn release(self) {
        self.cache.release(self)
    }

    fn slot_ref(&self) -> &Slot {
        &self.cache.slots[self.index]
    }
}

impl<'a> Deref for Buf<'a> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<'a> DerefMut for Buf<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<'a> Debug for Buf<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buf")
            .field("key", &self.key())
            .field("slot", &self.index)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

impl<'a> Drop for Buf<'a> {
    fn drop(&mut self) {
        // Unlock first so waiters for this block can proceed, then give back the
        // reference.
        // SAFETY: the guard is never touched again after this.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        self.cache.unref(self.index);
    }
}
