use std::{cell::Cell, sync::Arc};

use nonmax::NonMaxUsize;

use super::{IndexList, Link};

fn list(len: usize) -> IndexList<ListHead> {
    let links: Arc<[ListHead]> = (0..len).map(|_| ListHead::default()).collect();
    IndexList::new(links)
}

#[test]
fn index_list() {
    let mut list = list(100);
    assert!(list.is_empty());
    assert!(list.pop_front().is_none());

    list.push_back(0);
    assert_eq!(list.len(), 1);
    assert_eq!(list.pop_front(), Some(0));
    assert_eq!(list.pop_front(), None);
    assert!(list.is_empty());

    list.push_back(3);
    list.push_back(1);
    list.push_back(2);
    assert_eq!(list.iter().collect::<Vec<_>>(), [3, 1, 2]);
    assert_eq!(list.pop_front(), Some(3));
    assert_eq!(list.pop_front(), Some(1));
    assert_eq!(list.pop_front(), Some(2));
    assert_eq!(list.len(), 0);
}

#[test]
fn remove_middle() {
    let mut list = list(8);
    for i in 0..5 {
        list.push_back(i);
    }

    list.remove(2);
    list.remove(4);
    list.remove(0);
    assert_eq!(list.iter().collect::<Vec<_>>(), [1, 3]);
    assert_eq!(list.len(), 2);

    // A removed node can be relinked without stale links leaking in.
    list.push_back(2);
    assert_eq!(list.iter().collect::<Vec<_>>(), [1, 3, 2]);
    assert_eq!(list.links[2].next(), None);
}

#[derive(Debug, Default)]
struct ListHead {
    next: Cell<Option<NonMaxUsize>>,
    prev: Cell<Option<NonMaxUsize>>,
}

impl Link for ListHead {
    fn next(&self) -> Option<NonMaxUsize> {
        self.next.get()
    }

    fn prev(&self) -> Option<NonMaxUsize> {
        self.prev.get()
    }

    fn set_next(&self, next: Option<NonMaxUsize>) {
        self.next.set(next);
    }

    fn set_prev(&self, prev: Option<NonMaxUsize>) {
        self.prev.set(prev);
    }
}
