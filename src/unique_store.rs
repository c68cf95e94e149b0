//! The unique store dictionary.
//!
//! A [`UniqueStoreDictionary`] maps values stored in an external arena to a
//! single entry ref per distinct value. Adding a value that is already present
//! returns the existing ref instead of allocating a new one.
//!
//! The dictionary always keeps an ordered index, which is the source of truth
//! for enumeration and for [`ReadSnapshot`]s. It can optionally keep a hash
//! index as well, to speed up lookups of single values. Whether the hash index
//! exists is decided when the dictionary is built, with
//! [`DictionaryBuilder::hash_dictionary`].

use crate::common::entry_ref::EntryRef;

pub(crate) mod builder;
pub(crate) mod dictionary;
pub(crate) mod snapshot;

pub use builder::DictionaryBuilder;
pub use dictionary::UniqueStoreDictionary;
pub use snapshot::ReadSnapshot;

/// The outcome of [`UniqueStoreDictionary::add`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddResult {
    entry_ref: EntryRef,
    inserted: bool,
}

impl AddResult {
    pub fn new(entry_ref: EntryRef, inserted: bool) -> Self {
        Self {
            entry_ref,
            inserted,
        }
    }

    /// The ref of the unique value.
    pub fn entry_ref(&self) -> EntryRef {
        self.entry_ref
    }

    /// `true` if the value was not present before the add.
    pub fn inserted(&self) -> bool {
        self.inserted
    }
}

/// Relocates values of the backing arena during compaction.
pub trait Compactable {
    /// Returns the ref `old_ref`'s value now lives at. Returning `old_ref`
    /// itself means the value was not moved.
    fn move_entry(&mut self, old_ref: EntryRef) -> EntryRef;
}
