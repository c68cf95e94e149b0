#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! A dictionary that deduplicates the values of a unique store.
//!
//! Values live in an arena owned by the caller and are addressed by 32-bit
//! [`EntryRef`]s. The [`UniqueStoreDictionary`] keeps one ref per distinct
//! value in an ordered index and, optionally, in a sharded hash index built
//! from [`FixedSizeHashMap`]s. Comparisons go through an [`EntryComparator`]
//! that knows how to resolve refs to values.
//!
//! There is a single writer. Readers run concurrently with it, either through
//! [`ReadSnapshot`]s of the ordered index or through lock-free lookups in the
//! hash index. Memory freed by the writer is handed back for reuse only when
//! no reader can still see it, which is tracked with the generation types in
//! this crate ([`GenerationHandler`], [`GenerationHoldList`]).
//!
//! # Logging
//!
//! With the `logging` feature enabled, the crate emits records through the
//! [`log`](https://docs.rs/log) crate when hash shards grow, when the
//! dictionary is rebuilt and when entries are compacted.

pub(crate) mod common;
pub mod hash;
pub mod ordered;
pub mod unique_store;

pub use common::{
    comparator::EntryComparator,
    entry_ref::{AtomicEntryRef, AtomicKvPair, EntryRef, KvPair},
    error::{Error, Result},
    generation::{Generation, GenerationGuard, GenerationHandler, GenerationHoldList},
    memory_usage::MemoryUsage,
};
pub use hash::{FixedSizeHashMap, ShardedHashMap, NO_NODE_IDX};
pub use unique_store::{
    AddResult, Compactable, DictionaryBuilder, ReadSnapshot, UniqueStoreDictionary,
};
