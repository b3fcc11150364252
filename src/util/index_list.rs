use std::sync::Arc;

use nonmax::NonMaxUsize;

#[cfg(test)]
mod tests;

/// A doubly linked list threaded through an array of nodes by index.
///
/// The links live in the nodes themselves, so several lists may share one node
/// array as long as a node is a member of at most one of them at a time.
pub struct IndexList<L> {
    pub head: Option<NonMaxUsize>,
    pub tail: Option<NonMaxUsize>,
    pub links: Arc<[L]>,
    len: usize,
}

impl<L> IndexList<L>
where
    L: Link,
{
    pub fn new(links: Arc<[L]>) -> Self {
        Self {
            head: None,
            tail: None,
            links,
            len: 0,
        }
    }

    pub fn push_back(&mut self, index: usize) {
        let link = &self.links[index];
        link.set_next(None);
        link.set_prev(self.tail);

        if let Some(prev) = self.tail {
            self.links[prev.get()].set_next(NonMaxUsize::new(index));
        } else {
            self.head = NonMaxUsize::new(index);
        }
        self.tail = NonMaxUsize::new(index);
        self.len += 1;
    }

    pub fn remove(&mut self, index: usize) {
        let link = &self.links[index];
        let next = link.next();
        let prev = link.prev();

        if let Some(next) = next {
            self.links[next.get()].set_prev(prev);
        } else {
            self.tail = prev;
        }

        if let Some(prev) = prev {
            self.links[prev.get()].set_next(next);
        } else {
            self.head = next;
        }

        link.set_next(None);
        link.set_prev(None);
        self.len -= 1;
    }

    pub fn pop_front(&mut self) -> Option<usize> {
        let front = self.head?.get();
        self.remove(front);
        Some(front)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[cfg(test)]
    pub fn iter(&self) -> Iter<'_, L> {
        Iter {
            front: self.head,
            list: self,
        }
    }
}

pub trait Link {
    fn next(&self) -> Option<NonMaxUsize>;
    fn prev(&self) -> Option<NonMaxUsize>;
    fn set_next(&self, next: Option<NonMaxUsize>);
    fn set_prev(&self, prev: Option<NonMaxUsize>);
}

#[cfg(test)]
pub struct Iter<'a, L> {
    front: Option<NonMaxUsize>,
    list: &'a IndexList<L>,
}

#[cfg(test)]
impl<'a, L> Iterator for Iter<'a, L>
where
    L: Link,
{
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let front = self.front?;
        self.front = self.list.links[front.get()].next();
        Some(front.get())
    }
}
