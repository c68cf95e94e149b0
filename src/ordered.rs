//! The ordered index of the dictionary.
//!
//! Entries are kept sorted by the value their key refs stand for, as ordered by
//! an [`EntryComparator`]. The entry vector is shared copy-on-write:
//! [`OrderedDictionary::freeze`] publishes the current vector as the frozen
//! view without copying it, and the first mutation after that clones it once.
//! Frozen views are therefore immutable and can be read from any thread while
//! the writer keeps mutating the live index.

use std::{mem, sync::Arc};

use crate::common::{
    comparator::EntryComparator,
    entry_ref::{EntryRef, KvPair},
    memory_usage::MemoryUsage,
};

// First position whose key is not less than `key_ref`.
fn lower_bound(entries: &[KvPair], comp: &dyn EntryComparator, key_ref: EntryRef) -> usize {
    entries.partition_point(|kv| comp.less(kv.key, key_ref))
}

// First position whose key is greater than `key_ref`.
fn upper_bound(entries: &[KvPair], comp: &dyn EntryComparator, key_ref: EntryRef) -> usize {
    entries.partition_point(|kv| !comp.less(key_ref, kv.key))
}

/// A sorted index of key refs with associated values.
///
/// # Cost
///
/// Entries live in a single sorted vector. `insert` and `remove` shift the
/// entries after the position, which is O(n). The first mutation after a
/// [`freeze`](Self::freeze) also copies the whole vector, once: later mutations
/// reuse that copy until the next `freeze`. Freezing once per batch of writes
/// therefore costs one O(n) copy per batch. A tree with shared nodes would make
/// both logarithmic; this index favors cheap lookups and snapshots of small to
/// medium dictionaries.
#[derive(Debug, Default)]
pub struct OrderedDictionary {
    entries: Arc<Vec<KvPair>>,
    frozen: Arc<Vec<KvPair>>,
}

impl OrderedDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Vec::with_capacity(capacity)),
            frozen: Arc::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<KvPair> {
        self.entries.get(idx).copied()
    }

    /// Position of the first entry not less than `key_ref`, which is also the
    /// position a new entry for `key_ref` is inserted at.
    pub fn lower_bound(&self, comp: &dyn EntryComparator, key_ref: EntryRef) -> usize {
        lower_bound(&self.entries, comp, key_ref)
    }

    /// Position and contents of the entry equal to `key_ref`.
    pub fn find(&self, comp: &dyn EntryComparator, key_ref: EntryRef) -> Option<(usize, KvPair)> {
        let idx = self.lower_bound(comp, key_ref);
        self.get(idx)
            .filter(|kv| !comp.less(key_ref, kv.key))
            .map(|kv| (idx, kv))
    }

    pub fn iter(&self) -> impl Iterator<Item = &KvPair> + '_ {
        self.entries.iter()
    }

    // Copies the entries first if a frozen view still shares them.
    fn entries_mut(&mut self) -> &mut Vec<KvPair> {
        Arc::make_mut(&mut self.entries)
    }

    /// # Panics
    ///
    /// Panics if `idx > len`.
    pub fn insert(&mut self, idx: usize, kv: KvPair) {
        self.entries_mut().insert(idx, kv);
    }

    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn remove(&mut self, idx: usize) -> KvPair {
        self.entries_mut().remove(idx)
    }

    /// Replaces the key ref at `idx`. The new ref must stand for the same
    /// value, so the order is kept.
    pub fn set_key(&mut self, idx: usize, key: EntryRef) {
        self.entries_mut()[idx].key = key;
    }

    /// Replaces every entry. `entries` must be sorted.
    pub fn assign(&mut self, entries: Vec<KvPair>) {
        self.entries = Arc::new(entries);
    }

    /// Makes the current state the one returned by
    /// [`frozen_view`](Self::frozen_view).
    pub fn freeze(&mut self) {
        if !Arc::ptr_eq(&self.entries, &self.frozen) {
            self.frozen = Arc::clone(&self.entries);
        }
    }

    /// The state at the last [`freeze`](Self::freeze).
    pub fn frozen_view(&self) -> FrozenView {
        FrozenView {
            entries: Arc::clone(&self.frozen),
        }
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let entry_size = mem::size_of::<KvPair>();
        let mut usage = MemoryUsage {
            allocated_bytes: mem::size_of::<Self>() + self.entries.capacity() * entry_size,
            used_bytes: mem::size_of::<Self>() + self.entries.len() * entry_size,
            dead_bytes: 0,
            allocated_bytes_on_hold: 0,
        };
        if !Arc::ptr_eq(&self.entries, &self.frozen) {
            // The frozen copy lives until the last snapshot of it is dropped.
            let frozen_bytes = self.frozen.capacity() * entry_size;
            usage.allocated_bytes += frozen_bytes;
            usage.allocated_bytes_on_hold += frozen_bytes;
        }
        usage
    }
}

/// An immutable state of an [`OrderedDictionary`].
#[derive(Clone, Debug, Default)]
pub struct FrozenView {
    entries: Arc<Vec<KvPair>>,
}

impl FrozenView {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lower_bound(&self, comp: &dyn EntryComparator, key_ref: EntryRef) -> usize {
        lower_bound(&self.entries, comp, key_ref)
    }

    pub fn upper_bound(&self, comp: &dyn EntryComparator, key_ref: EntryRef) -> usize {
        upper_bound(&self.entries, comp, key_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KvPair> + '_ {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::OrderedDictionary;
    use std::sync::Arc;

    use crate::common::{
        entry_ref::{EntryRef, KvPair},
        test_utils::U32Comparator,
    };

    fn kv(key: u32) -> KvPair {
        KvPair::new(EntryRef::new(key), EntryRef::default())
    }

    fn keys(dict: &OrderedDictionary) -> Vec<u32> {
        dict.iter().map(|kv| kv.key.raw()).collect()
    }

    #[test]
    fn sorted_insert_and_find() {
        let comp = U32Comparator::probe(0);
        let mut dict = OrderedDictionary::new();
        for v in [5, 1, 3] {
            let idx = dict.lower_bound(&comp, EntryRef::new(v));
            dict.insert(idx, kv(v));
        }
        assert_eq!(keys(&dict), vec![1, 3, 5]);
        assert_eq!(dict.find(&comp, EntryRef::new(3)), Some((1, kv(3))));
        assert_eq!(dict.find(&U32Comparator::probe(5), EntryRef::default()), Some((2, kv(5))));
        assert_eq!(dict.find(&comp, EntryRef::new(4)), None);
        assert_eq!(dict.find(&comp, EntryRef::new(6)), None);

        assert_eq!(dict.remove(0), kv(1));
        assert_eq!(keys(&dict), vec![3, 5]);
    }

    #[test]
    fn mutations_between_freezes_copy_once() {
        let mut dict = OrderedDictionary::new();
        dict.assign((1..=100).map(kv).collect());
        dict.freeze();
        let frozen_ptr = Arc::as_ptr(&dict.entries);

        // Not shared any more: copied once, away from the frozen vector.
        dict.remove(0);
        let copy_ptr = Arc::as_ptr(&dict.entries);
        assert_ne!(copy_ptr, frozen_ptr);

        for v in 101..=150 {
            dict.insert(dict.len(), kv(v));
        }
        dict.set_key(0, EntryRef::new(2));
        assert_eq!(Arc::as_ptr(&dict.entries), copy_ptr);
        assert_eq!(dict.frozen_view().len(), 100);

        // The next batch copies again, since the new frozen view shares it.
        dict.freeze();
        assert_eq!(Arc::as_ptr(&dict.entries), copy_ptr);
        dict.remove(0);
        assert_ne!(Arc::as_ptr(&dict.entries), copy_ptr);
    }

    #[test]
    fn frozen_view_is_copy_on_write() {
        let mut dict = OrderedDictionary::new();
        dict.assign(vec![kv(1), kv(2)]);
        assert!(dict.frozen_view().is_empty());

        dict.freeze();
        let view = dict.frozen_view();
        assert_eq!(dict.memory_usage().allocated_bytes_on_hold, 0);

        dict.insert(2, kv(3));
        dict.set_key(0, EntryRef::new(9));
        assert_eq!(keys(&dict), vec![9, 2, 3]);
        assert_eq!(view.iter().map(|kv| kv.key.raw()).collect::<Vec<_>>(), vec![1, 2]);
        assert!(dict.memory_usage().allocated_bytes_on_hold > 0);

        dict.freeze();
        assert_eq!(dict.frozen_view().len(), 3);
        assert_eq!(view.len(), 2);
    }
}
