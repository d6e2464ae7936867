//! Singly linked lists threaded through the entry pool.
//!
//! A list only holds the index of its head; the links live in the entries
//! themselves, so every operation takes the pool's entry slice.

use crate::entry::{CacheEntry, EntryIndex};
use std::net::Ipv6Addr;

/// Head of an index-linked list of cache entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheEntryList {
    head: Option<EntryIndex>,
}

impl CacheEntryList {
    /// Create an empty list
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// First entry of the list
    pub fn head(&self) -> Option<EntryIndex> {
        self.head
    }

    /// Whether the list holds no entry
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Push an entry at the head
    pub fn push(&mut self, idx: EntryIndex, entries: &mut [CacheEntry]) {
        entries[idx.get()].next = self.head;
        self.head = Some(idx);
    }

    /// Pop the head entry
    pub fn pop(&mut self, entries: &mut [CacheEntry]) -> Option<EntryIndex> {
        let idx = self.head?;
        self.head = entries[idx.get()].next.take();
        Some(idx)
    }

    /// Unlink the entry following `prev`, or the head when `prev` is `None`
    pub fn pop_after(&mut self, prev: Option<EntryIndex>, entries: &mut [CacheEntry]) -> Option<EntryIndex> {
        match prev {
            None => self.pop(entries),
            Some(prev) => {
                let idx = entries[prev.get()].next?;
                entries[prev.get()].next = entries[idx.get()].next.take();
                Some(idx)
            }
        }
    }

    /// Iterate over the entry indices, head first
    pub fn iter<'a>(&self, entries: &'a [CacheEntry]) -> ListIter<'a> {
        ListIter {
            entries,
            next: self.head,
        }
    }

    /// Number of entries in the list
    pub fn len(&self, entries: &[CacheEntry]) -> usize {
        self.iter(entries).count()
    }

    /// Find the entry for `target`, along with its predecessor
    pub fn find_matching(
        &self,
        target: &Ipv6Addr,
        entries: &[CacheEntry],
    ) -> Option<(EntryIndex, Option<EntryIndex>)> {
        let mut prev = None;
        for idx in self.iter(entries) {
            if entries[idx.get()].target == *target {
                return Some((idx, prev));
            }
            prev = Some(idx);
        }
        None
    }

    /// Move every entry of `other` to the tail of this list
    pub fn append(&mut self, other: &mut CacheEntryList, entries: &mut [CacheEntry]) {
        let Some(other_head) = other.head.take() else {
            return;
        };

        match self.iter(entries).last() {
            Some(tail) => entries[tail.get()].next = Some(other_head),
            None => self.head = Some(other_head),
        }
    }

    /// Unlink every entry matching `pred`, returning them as a new list
    pub fn remove_all_matching<F>(&mut self, entries: &mut [CacheEntry], mut pred: F) -> CacheEntryList
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let mut removed = CacheEntryList::new();
        let mut prev = None;
        let mut cur = self.head;

        while let Some(idx) = cur {
            cur = entries[idx.get()].next;

            if pred(&entries[idx.get()]) {
                self.pop_after(prev, entries);
                removed.push(idx, entries);
            } else {
                prev = Some(idx);
            }
        }

        removed
    }
}

/// Iterator over the indices of a list
pub struct ListIter<'a> {
    entries: &'a [CacheEntry],
    next: Option<EntryIndex>,
}

impl Iterator for ListIter<'_> {
    type Item = EntryIndex;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.next?;
        self.next = self.entries[idx.get()].next;
        Some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: u16) -> Vec<CacheEntry> {
        (0..n)
            .map(|i| CacheEntry {
                target: Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, i),
                ..CacheEntry::default()
            })
            .collect()
    }

    fn indices(list: &CacheEntryList, entries: &[CacheEntry]) -> Vec<u16> {
        list.iter(entries).map(|idx| idx.0).collect()
    }

    #[test]
    fn test_push_pop_order() {
        let mut pool = entries(3);
        let mut list = CacheEntryList::new();
        for i in 0..3 {
            list.push(EntryIndex(i), &mut pool);
        }

        assert_eq!(indices(&list, &pool), vec![2, 1, 0]);
        assert_eq!(list.pop(&mut pool), Some(EntryIndex(2)));
        assert_eq!(list.len(&pool), 2);
    }

    #[test]
    fn test_find_and_pop_after() {
        let mut pool = entries(4);
        let mut list = CacheEntryList::new();
        for i in 0..4 {
            list.push(EntryIndex(i), &mut pool);
        }

        let target = Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1);
        let (idx, prev) = list.find_matching(&target, &pool).unwrap();
        assert_eq!(idx, EntryIndex(1));
        assert_eq!(prev, Some(EntryIndex(2)));

        assert_eq!(list.pop_after(prev, &mut pool), Some(idx));
        assert_eq!(indices(&list, &pool), vec![3, 2, 0]);
        assert!(list.find_matching(&target, &pool).is_none());
    }

    #[test]
    fn test_append_keeps_order() {
        let mut pool = entries(4);
        let mut first = CacheEntryList::new();
        let mut second = CacheEntryList::new();
        first.push(EntryIndex(0), &mut pool);
        first.push(EntryIndex(1), &mut pool);
        second.push(EntryIndex(2), &mut pool);
        second.push(EntryIndex(3), &mut pool);

        first.append(&mut second, &mut pool);
        assert!(second.is_empty());
        assert_eq!(indices(&first, &pool), vec![1, 0, 3, 2]);

        let mut empty = CacheEntryList::new();
        empty.append(&mut first, &mut pool);
        assert_eq!(indices(&empty, &pool), vec![1, 0, 3, 2]);
    }

    #[test]
    fn test_remove_all_matching() {
        let mut pool = entries(5);
        let mut list = CacheEntryList::new();
        for i in 0..5 {
            list.push(EntryIndex(i), &mut pool);
        }

        let removed = list.remove_all_matching(&mut pool, |e| e.target.segments()[7] % 2 == 0);
        assert_eq!(indices(&list, &pool), vec![3, 1]);

        let mut removed_ids = indices(&removed, &pool);
        removed_ids.sort_unstable();
        assert_eq!(removed_ids, vec![0, 2, 4]);
    }
}
