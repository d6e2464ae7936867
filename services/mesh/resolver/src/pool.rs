//! Fixed-capacity entry storage.

use crate::entry::{CacheEntry, EntryIndex};
use crate::list::CacheEntryList;
use std::ops::{Index, IndexMut};

/// Fixed set of cache entries, with the unused ones kept on a free list
#[derive(Debug)]
pub struct CacheEntryPool {
    entries: Vec<CacheEntry>,
    unused: CacheEntryList,
}

impl CacheEntryPool {
    /// Create a pool of `capacity` entries, all unused
    pub fn new(capacity: u16) -> Self {
        let mut entries = vec![CacheEntry::default(); capacity as usize];
        let mut unused = CacheEntryList::new();
        for i in (0..capacity).rev() {
            unused.push(EntryIndex(i), &mut entries);
        }
        Self { entries, unused }
    }

    /// Total number of entries
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of unused entries
    pub fn free_count(&self) -> usize {
        self.unused.len(&self.entries)
    }

    /// Take an unused entry, reset to defaults
    pub fn allocate(&mut self) -> Option<EntryIndex> {
        let idx = self.unused.pop(&mut self.entries)?;
        self.entries[idx.get()].reset();
        Some(idx)
    }

    /// Return an entry to the free list. The entry must not be on any
    /// other list.
    pub fn free(&mut self, idx: EntryIndex) {
        self.unused.push(idx, &mut self.entries);
    }

    pub(crate) fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [CacheEntry] {
        &mut self.entries
    }
}

impl Index<EntryIndex> for CacheEntryPool {
    type Output = CacheEntry;

    fn index(&self, idx: EntryIndex) -> &Self::Output {
        &self.entries[idx.get()]
    }
}

impl IndexMut<EntryIndex> for CacheEntryPool {
    fn index_mut(&mut self, idx: EntryIndex) -> &mut Self::Output {
        &mut self.entries[idx.get()]
    }
}
