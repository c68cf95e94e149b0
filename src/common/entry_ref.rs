use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

/// An opaque handle to a value stored in an external value arena.
///
/// The handle is never dereferenced by this crate; it is only handed to an
/// [`EntryComparator`][comparator] and to the caller's producer closures. The
/// zero value is reserved and means "no entry".
///
/// [comparator]: ./trait.EntryComparator.html
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryRef(u32);

impl EntryRef {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl From<u32> for EntryRef {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "EntryRef({})", self.0)
        } else {
            f.write_str("EntryRef(invalid)")
        }
    }
}

/// An [`EntryRef`] that can be installed by the writer while readers load it.
///
/// The writer publishes with `store_release` and readers observe with
/// `load_acquire`. The relaxed variants are for the writer's own reads and for
/// slots not yet reachable by readers.
#[derive(Default)]
pub struct AtomicEntryRef(AtomicU32);

impl AtomicEntryRef {
    pub const fn new(entry_ref: EntryRef) -> Self {
        Self(AtomicU32::new(entry_ref.0))
    }

    #[inline]
    pub fn load_relaxed(&self) -> EntryRef {
        EntryRef(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn load_acquire(&self) -> EntryRef {
        EntryRef(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store_relaxed(&self, entry_ref: EntryRef) {
        self.0.store(entry_ref.0, Ordering::Relaxed);
    }

    #[inline]
    pub fn store_release(&self, entry_ref: EntryRef) {
        self.0.store(entry_ref.0, Ordering::Release);
    }
}

impl fmt::Debug for AtomicEntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load_relaxed(), f)
    }
}

/// A key ref and its associated value ref, copied out of an index.
///
/// For the unique store the key identifies the deduplicated value and the value
/// holds associated data such as a payload or posting list handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct KvPair {
    pub key: EntryRef,
    pub value: EntryRef,
}

impl KvPair {
    pub const fn new(key: EntryRef, value: EntryRef) -> Self {
        Self { key, value }
    }
}

/// The atomic form of [`KvPair`] stored in hash map nodes.
#[derive(Debug, Default)]
pub struct AtomicKvPair {
    key: AtomicEntryRef,
    value: AtomicEntryRef,
}

impl AtomicKvPair {
    pub fn new(kv: KvPair) -> Self {
        Self {
            key: AtomicEntryRef::new(kv.key),
            value: AtomicEntryRef::new(kv.value),
        }
    }

    pub fn key(&self) -> &AtomicEntryRef {
        &self.key
    }

    pub fn value(&self) -> &AtomicEntryRef {
        &self.value
    }

    /// Writer side copy of the pair.
    pub fn load_relaxed(&self) -> KvPair {
        KvPair::new(self.key.load_relaxed(), self.value.load_relaxed())
    }

    /// Reader side copy of the pair.
    pub fn load_acquire(&self) -> KvPair {
        KvPair::new(self.key.load_acquire(), self.value.load_acquire())
    }

    pub(crate) fn clear(&self) {
        self.key.store_relaxed(EntryRef::default());
        self.value.store_relaxed(EntryRef::default());
    }
}
