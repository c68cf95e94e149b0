//! A growable hash index built from fixed size hash map shards.

use std::{
    fmt,
    sync::{atomic::Ordering, Arc},
};

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};

use super::fixed_size_hash_map::FixedSizeHashMap;
use crate::common::{
    comparator::EntryComparator,
    constants::{INITIAL_SHARD_CAPACITY, INITIAL_SHARD_MODULO},
    entry_ref::{AtomicKvPair, EntryRef, KvPair},
    generation::Generation,
    memory_usage::MemoryUsage,
};

/// A hash index over entry refs that grows by replacing full shards.
///
/// A key lives in shard `hash % num_shards`. Each shard is a
/// [`FixedSizeHashMap`] published through an epoch-protected pointer. Shards
/// are allocated on the first insertion, and a full shard is replaced by a map
/// of roughly twice its size holding the same live entries. The replaced map is
/// destroyed once every reader pinned at the time has unpinned.
///
/// The same single writer rule as for [`FixedSizeHashMap`] applies.
pub struct ShardedHashMap {
    maps: Box<[Atomic<FixedSizeHashMap>]>,
    // Compares and hashes stored refs when a shard is rehashed.
    comp: Arc<dyn EntryComparator + Send + Sync>,
}

impl ShardedHashMap {
    /// Creates an empty map with `num_shards` shards. `comp` is the default
    /// comparator, used to rehash stored refs when a shard grows.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0.
    pub fn new(num_shards: usize, comp: Arc<dyn EntryComparator + Send + Sync>) -> Self {
        assert!(num_shards > 0);

        let maps = (0..num_shards).map(|_| Atomic::null()).collect();
        Self { maps, comp }
    }

    pub fn num_shards(&self) -> usize {
        self.maps.len()
    }

    #[inline]
    fn shard_idx(&self, comp: &dyn EntryComparator, key_ref: EntryRef) -> usize {
        (comp.hash(key_ref) % self.maps.len() as u64) as usize
    }

    #[inline]
    fn shard(&self, comp: &dyn EntryComparator, key_ref: EntryRef) -> &Atomic<FixedSizeHashMap> {
        &self.maps[self.shard_idx(comp, key_ref)]
    }

    // Publishes `new_ptr` as the map of `shard` and retires the map it
    // replaces. Writer only.
    fn replace_shard<'g>(
        &self,
        shard: &Atomic<FixedSizeHashMap>,
        new_ptr: Shared<'g, FixedSizeHashMap>,
        guard: &'g Guard,
    ) {
        let old_ptr = shard.swap(new_ptr, Ordering::AcqRel, guard);
        if !old_ptr.is_null() {
            // Safety: The old map is no longer reachable through the shard.
            // Readers that loaded it before the swap are pinned, and the map is
            // only destroyed after they unpin.
            unsafe { guard.defer_destroy(old_ptr) };
        }
    }

    // Replaces the map of `shard` by an empty or a larger one. Writer only.
    fn grow_shard<'g>(
        &self,
        shard: &Atomic<FixedSizeHashMap>,
        guard: &'g Guard,
    ) -> Shared<'g, FixedSizeHashMap> {
        let num_stripes = self.maps.len() as u32;
        let current_ptr = shard.load(Ordering::Relaxed, guard);
        let new_map = match unsafe { current_ptr.as_ref() } {
            None => FixedSizeHashMap::new(INITIAL_SHARD_MODULO, INITIAL_SHARD_CAPACITY, num_stripes),
            Some(map) => {
                let size = map.size() as u32;
                #[cfg(feature = "logging")]
                log::debug!(
                    "Growing a full hash dictionary shard (size: {size}, capacity: {})",
                    map.capacity()
                );
                FixedSizeHashMap::from_existing(
                    size * 2 + 2,
                    size * 3 + 3,
                    num_stripes,
                    map,
                    &*self.comp,
                )
            }
        };

        let new_ptr = Owned::new(new_map).into_shared(guard);
        self.replace_shard(shard, new_ptr, guard);
        new_ptr
    }

    /// Returns the entry whose key compares equal to `key_ref`, adding a new
    /// one keyed by the ref produced by `insert_entry` if there is none.
    ///
    /// Never fails: a full shard is grown before the insertion.
    pub fn add<F>(&self, comp: &dyn EntryComparator, key_ref: EntryRef, insert_entry: F) -> KvPair
    where
        F: FnOnce() -> EntryRef,
    {
        let guard = &crossbeam_epoch::pin();
        let shard = self.shard(comp, key_ref);
        let mut map_ptr = shard.load(Ordering::Relaxed, guard);
        // Safety: Maps are only destroyed through `defer_destroy` and we are
        // pinned.
        if unsafe { map_ptr.as_ref() }.map_or(true, FixedSizeHashMap::full) {
            map_ptr = self.grow_shard(shard, guard);
        }
        let map = unsafe { map_ptr.deref() };
        match map.add(comp, key_ref, insert_entry) {
            Ok(kv) => kv.load_relaxed(),
            // The shard was grown above if it had no room left.
            Err(e) => unreachable!("{e}"),
        }
    }

    /// Removes the entry whose key compares equal to `key_ref` and returns its
    /// former contents.
    pub fn remove(&self, comp: &dyn EntryComparator, key_ref: EntryRef) -> Option<KvPair> {
        let guard = &crossbeam_epoch::pin();
        let map_ptr = self.shard(comp, key_ref).load(Ordering::Relaxed, guard);
        // Safety: See `add`.
        let map = unsafe { map_ptr.as_ref() }?;
        map.remove(comp, key_ref)
    }

    /// Looks up the entry whose key compares equal to `key_ref`. Reader safe.
    pub fn find(&self, comp: &dyn EntryComparator, key_ref: EntryRef) -> Option<KvPair> {
        let guard = &crossbeam_epoch::pin();
        let map_ptr = self.shard(comp, key_ref).load(Ordering::Acquire, guard);
        // Safety: See `add`.
        let map = unsafe { map_ptr.as_ref() }?;
        map.find(comp, key_ref).map(AtomicKvPair::load_acquire)
    }

    /// Calls `with_entry` on the stored entry whose key compares equal to
    /// `key_ref`, letting the writer update it in place. Returns `false` if
    /// there is no such entry.
    pub fn update(
        &self,
        comp: &dyn EntryComparator,
        key_ref: EntryRef,
        with_entry: impl FnOnce(&AtomicKvPair),
    ) -> bool {
        let guard = &crossbeam_epoch::pin();
        let map_ptr = self.shard(comp, key_ref).load(Ordering::Relaxed, guard);
        // Safety: See `add`.
        match unsafe { map_ptr.as_ref() }.and_then(|map| map.find(comp, key_ref)) {
            Some(kv) => {
                with_entry(kv);
                true
            }
            None => false,
        }
    }

    pub fn transfer_hold_lists(&self, generation: Generation) {
        self.for_each_map(|map| map.transfer_hold_lists(generation));
    }

    pub fn trim_hold_lists(&self, used_generation: Generation) {
        self.for_each_map(|map| map.trim_hold_lists(used_generation));
    }

    /// Drops every entry. Readers pinned on the old shards keep seeing them.
    pub fn clear(&self) {
        let guard = &crossbeam_epoch::pin();
        for shard in self.maps.iter() {
            self.replace_shard(shard, Shared::null(), guard);
        }
    }

    /// Replaces the contents of the map with `entries`, keys and values.
    ///
    /// Every shard is rebuilt aside and then published with a single pointer
    /// swap, so a concurrent reader sees each shard either wholly before or
    /// wholly after the rebuild. A key present in both never looks absent.
    ///
    /// # Panics
    ///
    /// Panics if two entries hold keys that compare equal.
    pub fn assign(&self, entries: &[KvPair]) {
        let mut shard_entries = vec![Vec::new(); self.maps.len()];
        for kv in entries {
            shard_entries[self.shard_idx(&*self.comp, kv.key)].push(*kv);
        }

        let guard = &crossbeam_epoch::pin();
        for (shard, entries) in self.maps.iter().zip(shard_entries) {
            let new_ptr = if entries.is_empty() {
                Shared::null()
            } else {
                Owned::new(self.build_shard(&entries)).into_shared(guard)
            };
            self.replace_shard(shard, new_ptr, guard);
        }
    }

    // Fills a map that no reader can see yet. Publishing it with
    // `replace_shard` makes the relaxed stores visible.
    fn build_shard(&self, entries: &[KvPair]) -> FixedSizeHashMap {
        let size = entries.len() as u32;
        let map = FixedSizeHashMap::new(size * 2 + 2, size * 3 + 3, self.maps.len() as u32);
        for kv in entries {
            match map.add(&*self.comp, kv.key, || kv.key) {
                Ok(stored) => stored.value().store_relaxed(kv.value),
                // Sized above for every entry.
                Err(e) => unreachable!("{e}"),
            }
        }
        assert_eq!(
            map.size(),
            entries.len(),
            "entries must hold no duplicate keys"
        );
        map
    }

    /// Number of live entries over all shards.
    pub fn size(&self) -> usize {
        let mut size = 0;
        self.for_each_map(|map| size += map.size());
        size
    }

    /// Calls `f` with a copy of every live entry. Writer only.
    pub fn for_each(&self, mut f: impl FnMut(KvPair)) {
        self.for_each_map(|map| map.for_each(|kv| f(kv.load_relaxed())));
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = MemoryUsage::default();
        self.for_each_map(|map| usage.merge(&map.memory_usage()));
        usage
    }

    fn for_each_map(&self, mut f: impl FnMut(&FixedSizeHashMap)) {
        let guard = &crossbeam_epoch::pin();
        for shard in self.maps.iter() {
            let map_ptr = shard.load(Ordering::Acquire, guard);
            // Safety: See `add`.
            if let Some(map) = unsafe { map_ptr.as_ref() } {
                f(map);
            }
        }
    }
}

impl Drop for ShardedHashMap {
    fn drop(&mut self) {
        // Safety: We have `&mut self`, so no reader holds a reference into the
        // shards any more.
        let guard = unsafe { crossbeam_epoch::unprotected() };
        for shard in self.maps.iter() {
            let map_ptr = shard.swap(Shared::null(), Ordering::Relaxed, guard);
            if !map_ptr.is_null() {
                drop(unsafe { map_ptr.into_owned() });
            }
        }
    }
}

impl fmt::Debug for ShardedHashMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedHashMap")
            .field("num_shards", &self.num_shards())
            .field("size", &self.size())
            .finish()
    }
}
