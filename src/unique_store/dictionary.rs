use std::{fmt, sync::Arc};

use super::{AddResult, Compactable, DictionaryBuilder, ReadSnapshot};
use crate::{
    common::{
        comparator::EntryComparator,
        entry_ref::{EntryRef, KvPair},
        error::{Error, Result},
        generation::Generation,
        memory_usage::MemoryUsage,
    },
    hash::ShardedHashMap,
    ordered::OrderedDictionary,
};

/// A dictionary of unique values for a unique store.
///
/// Values live in an external arena and are identified by [`EntryRef`]s. The
/// dictionary makes sure there is only one ref per distinct value, as decided
/// by the [`EntryComparator`]s passed to each call. Such a per-call comparator
/// carries the value being looked up or added, which the invalid ref stands
/// for.
///
/// The dictionary also holds a *default comparator* that compares stored refs
/// only. It is used by the operations that have no probe value: bulk builds,
/// compaction and hash index growth.
///
/// # Indexes
///
/// The ordered index is always present. When built with a hash index, both are
/// updated together by every mutating method, and a disagreement between them
/// is a bug that panics.
///
/// # Concurrency
///
/// All mutating methods take `&mut self`, so there is one writer at a time.
/// Readers in other threads use [`ReadSnapshot`]s, which are unaffected by
/// later writes, or look up values in the shared hash index returned by
/// [`hash_dictionary`](Self::hash_dictionary). Nodes removed from the hash
/// index are reused only after the owner calls
/// [`transfer_hold_lists`](Self::transfer_hold_lists) and
/// [`trim_hold_lists`](Self::trim_hold_lists) with a used generation that no
/// reader predates.
pub struct UniqueStoreDictionary {
    ordered: OrderedDictionary,
    hash: Option<Arc<ShardedHashMap>>,
    comp: Arc<dyn EntryComparator + Send + Sync>,
}

impl UniqueStoreDictionary {
    /// Creates a dictionary with only an ordered index.
    pub fn new(comp: Arc<dyn EntryComparator + Send + Sync>) -> Self {
        Self::builder(comp).build()
    }

    /// Returns a [`DictionaryBuilder`], which can build a dictionary with
    /// various configuration knobs.
    pub fn builder(comp: Arc<dyn EntryComparator + Send + Sync>) -> DictionaryBuilder {
        DictionaryBuilder::new(comp)
    }

    pub(crate) fn with_everything(
        comp: Arc<dyn EntryComparator + Send + Sync>,
        hash_dictionary: bool,
        num_hash_shards: usize,
        initial_capacity: usize,
    ) -> Self {
        let hash = if hash_dictionary {
            Some(Arc::new(ShardedHashMap::new(num_hash_shards, Arc::clone(&comp))))
        } else {
            None
        };

        Self {
            ordered: OrderedDictionary::with_capacity(initial_capacity),
            hash,
            comp,
        }
    }

    /// Returns `true` if this dictionary keeps a hash index. Fixed at
    /// construction.
    pub fn has_hash_dictionary(&self) -> bool {
        self.hash.is_some()
    }

    /// A shared handle to the hash index, for lock-free lookups from reader
    /// threads. `None` when the dictionary has no hash index.
    ///
    /// Readers must only call [`ShardedHashMap::find`] on it.
    pub fn hash_dictionary(&self) -> Option<Arc<ShardedHashMap>> {
        self.hash.clone()
    }

    /// Returns the ref of the value carried by `comp`, calling `insert_entry`
    /// to allocate it in the arena if it is not present yet.
    ///
    /// `insert_entry` is called at most once. With a hash index, a value that
    /// is already present is found there and the ordered index is not searched.
    pub fn add<F>(&mut self, comp: &dyn EntryComparator, insert_entry: F) -> AddResult
    where
        F: FnOnce() -> EntryRef,
    {
        let probe = EntryRef::default();
        if let Some(existing) = self.hash.as_ref().and_then(|hash| hash.find(comp, probe)) {
            return AddResult::new(existing.key, false);
        }

        let idx = self.ordered.lower_bound(comp, probe);
        if let Some(existing) = self.ordered.get(idx).filter(|kv| !comp.less(probe, kv.key)) {
            assert!(
                self.hash.is_none(),
                "the hash dictionary lost a value of the ordered dictionary"
            );
            return AddResult::new(existing.key, false);
        }

        let new_ref = insert_entry();
        self.ordered
            .insert(idx, KvPair::new(new_ref, EntryRef::default()));
        if let Some(hash) = &self.hash {
            let added = hash.add(comp, probe, || new_ref);
            assert_eq!(
                added.key, new_ref,
                "the hash dictionary holds a value missing from the ordered dictionary"
            );
        }
        AddResult::new(new_ref, true)
    }

    /// Returns the ref of the value carried by `comp`, or the invalid ref if it
    /// is not present.
    pub fn find(&self, comp: &dyn EntryComparator) -> EntryRef {
        let probe = EntryRef::default();
        if let Some(hash) = &self.hash {
            let found = hash.find(comp, probe).map_or(probe, |kv| kv.key);
            debug_assert_eq!(found, self.find_ordered(comp));
            return found;
        }
        self.find_ordered(comp)
    }

    fn find_ordered(&self, comp: &dyn EntryComparator) -> EntryRef {
        self.ordered
            .find(comp, EntryRef::default())
            .map_or(EntryRef::default(), |(_, kv)| kv.key)
    }

    /// Removes `entry_ref` from both indexes. Does nothing if the dictionary
    /// does not hold exactly this ref.
    pub fn remove(&mut self, comp: &dyn EntryComparator, entry_ref: EntryRef) {
        debug_assert!(entry_ref.is_valid());

        match self.ordered.find(comp, entry_ref) {
            Some((idx, kv)) if kv.key == entry_ref => {
                self.ordered.remove(idx);
                if let Some(hash) = &self.hash {
                    let removed = hash.remove(comp, entry_ref).map(|kv| kv.key);
                    assert_eq!(
                        removed,
                        Some(entry_ref),
                        "the hash dictionary lost a value of the ordered dictionary"
                    );
                }
            }
            _ => {
                if let Some(hash) = &self.hash {
                    debug_assert_ne!(
                        hash.find(comp, entry_ref).map(|kv| kv.key),
                        Some(entry_ref)
                    );
                }
            }
        }
    }

    /// Makes the current state of the ordered index the one seen by
    /// [`get_read_snapshot`](Self::get_read_snapshot).
    pub fn freeze(&mut self) {
        self.ordered.freeze();
    }

    /// Stamps the hash index nodes removed since the last call with
    /// `generation`.
    pub fn transfer_hold_lists(&mut self, generation: Generation) {
        if let Some(hash) = &self.hash {
            hash.transfer_hold_lists(generation);
        }
    }

    /// Makes the hash index nodes stamped before `used_generation` reusable.
    ///
    /// No reader may still be in a generation before `used_generation`.
    pub fn trim_hold_lists(&mut self, used_generation: Generation) {
        if let Some(hash) = &self.hash {
            hash.trim_hold_lists(used_generation);
        }
    }

    /// Lets `compactable` relocate the value of every entry and rewrites the
    /// refs of the moved ones in both indexes.
    pub fn move_entries(&mut self, compactable: &mut dyn Compactable) {
        let mut _moved = 0usize;
        for idx in 0..self.ordered.len() {
            let old_ref = match self.ordered.get(idx) {
                Some(kv) => kv.key,
                None => break,
            };
            let new_ref = compactable.move_entry(old_ref);
            if new_ref == old_ref {
                continue;
            }
            self.ordered.set_key(idx, new_ref);
            if let Some(hash) = &self.hash {
                let updated = hash.update(&*self.comp, old_ref, |kv| {
                    assert_eq!(kv.key().load_relaxed(), old_ref);
                    kv.key().store_release(new_ref);
                });
                assert!(
                    updated,
                    "the hash dictionary lost a value of the ordered dictionary"
                );
            }
            _moved += 1;
        }

        #[cfg(feature = "logging")]
        log::debug!(
            "Moved {_moved} of {} unique store entries",
            self.ordered.len()
        );
    }

    /// Replaces the contents of the dictionary with the refs whose count is not
    /// zero. Refs with a zero count are passed to `hold` instead, so that the
    /// caller can release them. Invalid refs are skipped.
    ///
    /// `refs` must be sorted by the default comparator and hold no duplicate
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuildLengthMismatch`] if `ref_counts` does not have one
    /// count per ref. The dictionary is unchanged in that case.
    pub fn build(
        &mut self,
        refs: &[EntryRef],
        ref_counts: &[u32],
        mut hold: impl FnMut(EntryRef),
    ) -> Result<()> {
        if refs.len() != ref_counts.len() {
            return Err(Error::BuildLengthMismatch {
                refs: refs.len(),
                values: ref_counts.len(),
            });
        }

        let mut entries = Vec::with_capacity(refs.len());
        for (&entry_ref, &ref_count) in refs.iter().zip(ref_counts) {
            if !entry_ref.is_valid() {
                continue;
            }
            if ref_count != 0 {
                entries.push(KvPair::new(entry_ref, EntryRef::default()));
            } else {
                hold(entry_ref);
            }
        }
        self.assign(entries);
        Ok(())
    }

    /// Replaces the contents of the dictionary with `refs`. Invalid refs are
    /// skipped.
    ///
    /// `refs` must be sorted by the default comparator and hold no duplicate
    /// values.
    pub fn build_all(&mut self, refs: &[EntryRef]) {
        let entries = refs
            .iter()
            .filter(|entry_ref| entry_ref.is_valid())
            .map(|&entry_ref| KvPair::new(entry_ref, EntryRef::default()))
            .collect();
        self.assign(entries);
    }

    /// Replaces the contents of the dictionary with `refs`, associating each
    /// one with the payload at the same position. Invalid refs are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuildLengthMismatch`] if `payloads` does not have one
    /// payload per ref. The dictionary is unchanged in that case.
    pub fn build_with_payload(&mut self, refs: &[EntryRef], payloads: &[u32]) -> Result<()> {
        if refs.len() != payloads.len() {
            return Err(Error::BuildLengthMismatch {
                refs: refs.len(),
                values: payloads.len(),
            });
        }

        let entries = refs
            .iter()
            .zip(payloads)
            .filter(|(entry_ref, _)| entry_ref.is_valid())
            .map(|(&entry_ref, &payload)| KvPair::new(entry_ref, EntryRef::new(payload)))
            .collect();
        self.assign(entries);
        Ok(())
    }

    fn assign(&mut self, entries: Vec<KvPair>) {
        debug_assert!(
            entries
                .windows(2)
                .all(|pair| self.comp.less(pair[0].key, pair[1].key)),
            "refs must be sorted and unique"
        );

        #[cfg(feature = "logging")]
        log::debug!(
            "Building the unique store dictionary with {} entries (hash dictionary: {})",
            entries.len(),
            self.has_hash_dictionary()
        );

        if let Some(hash) = &self.hash {
            hash.assign(&entries);
        }
        self.ordered.assign(entries);
    }

    /// A snapshot of the ordered index as of the last
    /// [`freeze`](Self::freeze).
    pub fn get_read_snapshot(&self) -> ReadSnapshot {
        ReadSnapshot::new(self.ordered.frozen_view())
    }

    /// Number of unique values.
    pub fn num_uniques(&self) -> usize {
        self.ordered.len()
    }

    pub fn ordered_memory_usage(&self) -> MemoryUsage {
        self.ordered.memory_usage()
    }

    pub fn hash_memory_usage(&self) -> MemoryUsage {
        self.hash
            .as_ref()
            .map(|hash| hash.memory_usage())
            .unwrap_or_default()
    }

    /// Memory used by both indexes.
    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.ordered_memory_usage();
        usage.merge(&self.hash_memory_usage());
        usage
    }
}

impl fmt::Debug for UniqueStoreDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueStoreDictionary")
            .field("num_uniques", &self.num_uniques())
            .field("has_hash_dictionary", &self.has_hash_dictionary())
            .finish()
    }
}
