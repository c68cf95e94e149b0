use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};

use parking_lot::RwLock;

use super::{comparator::EntryComparator, entry_ref::EntryRef};
use crate::unique_store::Compactable;

/// A grow-only string arena. Entry ref `n` addresses `values[n]`; slot 0 is
/// reserved for the invalid ref.
#[derive(Debug)]
pub(crate) struct StringStore {
    values: RwLock<Vec<String>>,
}

impl StringStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            values: RwLock::new(vec![String::new()]),
        })
    }

    pub(crate) fn allocate(&self, value: &str) -> EntryRef {
        let mut values = self.values.write();
        values.push(value.to_string());
        EntryRef::new((values.len() - 1) as u32)
    }

    pub(crate) fn get(&self, entry_ref: EntryRef) -> String {
        self.values.read()[entry_ref.raw() as usize].clone()
    }

    pub(crate) fn num_allocated(&self) -> usize {
        self.values.read().len() - 1
    }
}

/// Compares entries of a [`StringStore`]. The invalid ref resolves to `probe`.
#[derive(Clone)]
pub(crate) struct StoreComparator {
    store: Arc<StringStore>,
    probe: Option<String>,
}

impl StoreComparator {
    pub(crate) fn new(store: &Arc<StringStore>) -> Self {
        Self {
            store: Arc::clone(store),
            probe: None,
        }
    }

    pub(crate) fn probe(store: &Arc<StringStore>, value: &str) -> Self {
        Self {
            store: Arc::clone(store),
            probe: Some(value.to_string()),
        }
    }

    fn resolve(&self, entry_ref: EntryRef) -> String {
        if entry_ref.is_valid() {
            self.store.get(entry_ref)
        } else {
            self.probe.clone().expect("comparator has no probe value")
        }
    }
}

impl EntryComparator for StoreComparator {
    fn less(&self, lhs: EntryRef, rhs: EntryRef) -> bool {
        self.resolve(lhs) < self.resolve(rhs)
    }

    fn equal(&self, lhs: EntryRef, rhs: EntryRef) -> bool {
        self.resolve(lhs) == self.resolve(rhs)
    }

    fn hash(&self, entry_ref: EntryRef) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.resolve(entry_ref).hash(&mut hasher);
        hasher.finish()
    }
}

/// Copies every moved value to a fresh slot, like a compacting arena would.
pub(crate) struct StoreCompactor {
    pub(crate) store: Arc<StringStore>,
    pub(crate) moved: Vec<(EntryRef, EntryRef)>,
}

impl StoreCompactor {
    pub(crate) fn new(store: &Arc<StringStore>) -> Self {
        Self {
            store: Arc::clone(store),
            moved: Vec::new(),
        }
    }
}

impl Compactable for StoreCompactor {
    fn move_entry(&mut self, old_ref: EntryRef) -> EntryRef {
        let value = self.store.get(old_ref);
        let new_ref = self.store.allocate(&value);
        self.moved.push((old_ref, new_ref));
        new_ref
    }
}

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Entry ref `n` stores the value `n`; the invalid ref stands for `probe`.
/// Hashes into five distinct values, which gives long chains.
pub(crate) struct U32Comparator {
    probe: u32,
}

impl U32Comparator {
    pub(crate) fn probe(value: u32) -> Self {
        Self { probe: value }
    }

    fn value(&self, entry_ref: EntryRef) -> u32 {
        if entry_ref.is_valid() {
            entry_ref.raw()
        } else {
            self.probe
        }
    }
}

impl EntryComparator for U32Comparator {
    fn less(&self, lhs: EntryRef, rhs: EntryRef) -> bool {
        self.value(lhs) < self.value(rhs)
    }

    fn equal(&self, lhs: EntryRef, rhs: EntryRef) -> bool {
        self.value(lhs) == self.value(rhs)
    }

    fn hash(&self, entry_ref: EntryRef) -> u64 {
        self.value(entry_ref) as u64 % 5
    }
}
