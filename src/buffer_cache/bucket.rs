use std::sync::Arc;

use cache_padded::CachePadded;
use nonmax::NonMaxUsize;

use crate::{stop, util::index_list::IndexList, BlockKey};

use super::slot::Slot;

/// One partition of the key space: a hash chain of the slots whose block maps
/// here, and an LRU ring of those that are currently unreferenced.
///
/// Every method requires the bucket's lock, which is enforced by needing the
/// guard to reach the bucket at all.
pub(super) struct Bucket {
    chain: Option<NonMaxUsize>,
    lru: IndexList<CachePadded<Slot>>,
}

impl Bucket {
    pub fn new(slots: Arc<[CachePadded<Slot>]>) -> Self {
        Self {
            chain: None,
            lru: IndexList::new(slots),
        }
    }

    pub fn find(&self, key: BlockKey) -> Option<usize> {
        self.chain_iter()
            .find(|&i| self.lru.links[i].key() == key)
    }

    /// Link a slot into the chain under its current key.
    pub fn insert(&mut self, index: usize) {
        debug_assert!(
            self.chain_iter().all(|i| i != index),
            "slot {} is already chained",
            index
        );

        self.lru.links[index].set_hash_next(self.chain);
        self.chain = NonMaxUsize::new(index);
    }

    pub fn remove(&mut self, index: usize) {
        let slots = &self.lru.links;
        let mut prev: Option<usize> = None;
        let mut cur = self.chain;

        while let Some(i) = cur {
            let i = i.get();
            let next = slots[i].hash_next();
            if i == index {
                match prev {
                    Some(prev) => slots[prev].set_hash_next(next),
                    None => self.chain = next,
                }
                slots[i].set_hash_next(None);
                return;
            }
            prev = Some(i);
            cur = next;
        }

        stop(format_args!("slot {} is missing from its hash chain", index))
    }

    pub fn lru_pop_oldest(&mut self) -> Option<usize> {
        self.lru.pop_front()
    }

    pub fn lru_push_newest(&mut self, index: usize) {
        self.lru.push_back(index);
    }

    /// Take a slot out of the ring without evicting it, as on a hit.
    pub fn lru_remove(&mut self, index: usize) {
        self.lru.remove(index);
    }

    /// The number of evictable slots.
    pub fn free(&self) -> usize {
        self.lru.len()
    }

    fn chain_iter(&self) -> impl '_ + Iterator<Item = usize> {
        let slots = &self.lru.links;
        let mut cur = self.chain;
        std::iter::from_fn(move || {
            let i = cur?.get();
            cur = slots[i].hash_next();
            Some(i)
        })
    }

    #[cfg(test)]
    pub fn chained(&self) -> Vec<usize> {
        self.chain_iter().collect()
    }

    #[cfg(test)]
    pub fn ring(&self) -> Vec<usize> {
        self.lru.iter().collect()
    }
}
