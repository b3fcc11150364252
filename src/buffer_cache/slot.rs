use std::{
    ops::Deref,
    sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering},
};

use bitflags::bitflags;
use cache_padded::CachePadded;
use nonmax::NonMaxUsize;

use crate::{stop, sync::SleepLock, util::index_list::Link, BlockKey};

bitflags! {
    pub(super) struct SlotFlags: u8 {
        /// Linked into the hash chain of the bucket its key maps to.
        const ASSIGNED = 1 << 0;
        /// The content mirrors the device.
        const VALID = 1 << 1;
    }
}

/// One block-sized buffer and its bookkeeping.
///
/// Identity and links are only changed while holding the lock of the bucket the
/// slot currently belongs to, and so is any reference count change to or from
/// zero. Pin and unpin adjust the reference count and pin count of a leased slot
/// under the cache's pin lock instead. The bytes themselves are guarded by `data`.
pub(super) struct Slot {
    key: AtomicU64,
    flags: AtomicU8,
    refcount: AtomicUsize,
    pins: AtomicUsize,
    lru_next: AtomicUsize,
    lru_prev: AtomicUsize,
    hash_next: AtomicUsize,
    pub data: SleepLock<Box<[u8]>>,
}

impl Slot {
    pub fn new(block_size: usize) -> Self {
        Self {
            key: Default::default(),
            flags: Default::default(),
            refcount: Default::default(),
            pins: Default::default(),
            lru_next: AtomicUsize::new(usize::MAX),
            lru_prev: AtomicUsize::new(usize::MAX),
            hash_next: AtomicUsize::new(usize::MAX),
            data: SleepLock::new(vec![0; block_size].into_boxed_slice()),
        }
    }

    pub fn key(&self) -> BlockKey {
        BlockKey::from_u64(self.key.load(Ordering::Relaxed))
    }

    pub fn flags(&self) -> SlotFlags {
        SlotFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub fn is_assigned(&self) -> bool {
        self.flags().contains(SlotFlags::ASSIGNED)
    }

    pub fn is_valid(&self) -> bool {
        self.flags().contains(SlotFlags::VALID)
    }

    pub fn set_valid(&self) {
        self.flags
            .fetch_or(SlotFlags::VALID.bits(), Ordering::Release);
    }

    /// Give the slot a new identity with a single reference. The old content is
    /// no longer valid.
    pub fn assign(&self, key: BlockKey) {
        self.key.store(key.to_u64(), Ordering::Relaxed);
        self.flags
            .store(SlotFlags::ASSIGNED.bits(), Ordering::Release);
        self.refcount.store(1, Ordering::Relaxed);
    }

    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    /// Take a reference, returning the previous count.
    pub fn get(&self) -> usize {
        self.refcount.fetch_add(1, Ordering::AcqRel)
    }

    /// Drop a reference, returning the new count.
    pub fn put(&self) -> usize {
        match self
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => stop(format_args!("refcount underflow on block {}", self.key())),
        }
    }

    pub fn pins(&self) -> usize {
        self.pins.load(Ordering::Relaxed)
    }

    pub fn pin(&self) {
        self.pins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unpin(&self) {
        self.pins.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn hash_next(&self) -> Option<NonMaxUsize> {
        NonMaxUsize::new(self.hash_next.load(Ordering::Relaxed))
    }

    pub fn set_hash_next(&self, next: Option<NonMaxUsize>) {
        self.hash_next.store(encode(next), Ordering::Relaxed);
    }
}

impl Link for Slot {
    fn next(&self) -> Option<NonMaxUsize> {
        NonMaxUsize::new(self.lru_next.load(Ordering::Relaxed))
    }

    fn prev(&self) -> Option<NonMaxUsize> {
        NonMaxUsize::new(self.lru_prev.load(Ordering::Relaxed))
    }

    fn set_next(&self, next: Option<NonMaxUsize>) {
        self.lru_next.store(encode(next), Ordering::Relaxed);
    }

    fn set_prev(&self, prev: Option<NonMaxUsize>) {
        self.lru_prev.store(encode(prev), Ordering::Relaxed);
    }
}

impl<L> Link for CachePadded<L>
where
    L: Link,
{
    fn next(&self) -> Option<NonMaxUsize> {
        self.deref().next()
    }

    fn prev(&self) -> Option<NonMaxUsize> {
        self.deref().prev()
    }

    fn set_next(&self, next: Option<NonMaxUsize>) {
        self.deref().set_next(next)
    }

    fn set_prev(&self, prev: Option<NonMaxUsize>) {
        self.deref().set_prev(prev);
    }
}

fn encode(link: Option<NonMaxUsize>) -> usize {
    link.map_or(usize::MAX, |l| l.get())
}
