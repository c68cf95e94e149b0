use crate::{
    common::{comparator::EntryComparator, entry_ref::EntryRef},
    ordered::FrozenView,
};

/// A point-in-time view of the dictionary's ordered index.
///
/// A `ReadSnapshot` reflects the dictionary as it was at the last
/// [`freeze`][freeze] before the snapshot was taken. Later adds and removes on
/// the dictionary never change what a snapshot counts or enumerates. Snapshots
/// are cheap to clone and can be sent to other threads.
///
/// [freeze]: ./struct.UniqueStoreDictionary.html#method.freeze
#[derive(Clone, Debug)]
pub struct ReadSnapshot {
    frozen_view: FrozenView,
}

impl ReadSnapshot {
    pub(crate) fn new(frozen_view: FrozenView) -> Self {
        Self { frozen_view }
    }

    /// Number of entries equal to the probe value of `comp`.
    pub fn count(&self, comp: &dyn EntryComparator) -> usize {
        let probe = EntryRef::default();
        let low = self.frozen_view.lower_bound(comp, probe);
        let high = self.frozen_view.upper_bound(comp, probe);
        high - low
    }

    /// Number of entries between the probe values of `low` and `high`, both
    /// inclusive. Returns 0 when `high` orders before `low`.
    pub fn count_in_range(&self, low: &dyn EntryComparator, high: &dyn EntryComparator) -> usize {
        let probe = EntryRef::default();
        let low_idx = self.frozen_view.lower_bound(low, probe);
        let high_idx = self.frozen_view.upper_bound(high, probe);
        high_idx.saturating_sub(low_idx)
    }

    /// Calls `callback` with every key in ascending order.
    pub fn foreach_key(&self, mut callback: impl FnMut(EntryRef)) {
        self.frozen_view.iter().for_each(|kv| callback(kv.key));
    }

    /// Calls `callback` with every key and its associated value in ascending
    /// key order.
    pub fn foreach_entry(&self, mut callback: impl FnMut(EntryRef, EntryRef)) {
        self.frozen_view
            .iter()
            .for_each(|kv| callback(kv.key, kv.value));
    }

    pub fn len(&self) -> usize {
        self.frozen_view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frozen_view.is_empty()
    }
}
