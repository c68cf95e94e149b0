//! Hash indexes over entry refs.
//!
//! The hash maps in this module never store values themselves. Keys are
//! [`EntryRef`][entry-ref]s into an external value arena, and every hash and
//! equality decision goes through an [`EntryComparator`][comparator] supplied
//! per call.
//!
//! [`FixedSizeHashMap`] is a chained hash table built from a flat node array.
//! Chain heads and `next` links are atomic node indices: the single writer
//! publishes a node with a release store into a chain head or a predecessor's
//! `next`, and readers walk chains with acquire loads. A reader therefore sees
//! either the chain before a mutation or after it, never a partially linked
//! node. Removed nodes keep their `next` link and go on a generation hold list,
//! so a reader that was standing on a removed node can always finish its walk.
//! Slots are only reused once the owner reports that no reader can still be in
//! the generation the node was removed in.
//!
//! A [`FixedSizeHashMap`] never grows. [`ShardedHashMap`] spreads keys over a
//! few such maps and, when a shard is full, replaces it with a larger copy
//! before the next insertion. Replaced maps are retired through
//! `crossbeam-epoch`, so readers that loaded the old map keep using it safely
//! until they unpin.
//!
//! [entry-ref]: ../struct.EntryRef.html
//! [comparator]: ../trait.EntryComparator.html

pub(crate) mod fixed_size_hash_map;
pub(crate) mod sharded_hash_map;

pub use fixed_size_hash_map::{FixedSizeHashMap, NO_NODE_IDX};
pub use sharded_hash_map::ShardedHashMap;
