use std::sync::Arc;

use super::UniqueStoreDictionary;
use crate::common::{
    comparator::EntryComparator,
    constants::{DEFAULT_INITIAL_CAPACITY, DEFAULT_NUM_SHARDS},
};

/// Builds a [`UniqueStoreDictionary`][dictionary-struct] with various
/// configuration knobs.
///
/// [dictionary-struct]: ./struct.UniqueStoreDictionary.html
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use unique_store::{EntryComparator, EntryRef, UniqueStoreDictionary};
///
/// // Entry ref `n` stands for the number `n`.
/// struct Numbers;
///
/// impl EntryComparator for Numbers {
///     fn less(&self, lhs: EntryRef, rhs: EntryRef) -> bool {
///         lhs.raw() < rhs.raw()
///     }
///     fn equal(&self, lhs: EntryRef, rhs: EntryRef) -> bool {
///         lhs == rhs
///     }
///     fn hash(&self, entry_ref: EntryRef) -> u64 {
///         entry_ref.raw() as u64
///     }
/// }
///
/// let dictionary = UniqueStoreDictionary::builder(Arc::new(Numbers))
///     // Keep a hash index next to the ordered one.
///     .hash_dictionary(true)
///     .num_hash_shards(4)
///     .initial_capacity(1_000)
///     .build();
///
/// assert!(dictionary.has_hash_dictionary());
/// assert_eq!(dictionary.num_uniques(), 0);
/// ```
pub struct DictionaryBuilder {
    comp: Arc<dyn EntryComparator + Send + Sync>,
    hash_dictionary: bool,
    num_hash_shards: Option<usize>,
    initial_capacity: Option<usize>,
}

impl DictionaryBuilder {
    pub(crate) fn new(comp: Arc<dyn EntryComparator + Send + Sync>) -> Self {
        Self {
            comp,
            hash_dictionary: false,
            num_hash_shards: None,
            initial_capacity: None,
        }
    }

    /// Sets whether the dictionary keeps a hash index next to its ordered
    /// index. Disabled by default.
    pub fn hash_dictionary(self, enabled: bool) -> Self {
        Self {
            hash_dictionary: enabled,
            ..self
        }
    }

    /// Sets the number of shards of the hash index. Ignored when the hash index
    /// is disabled.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0.
    pub fn num_hash_shards(self, num_shards: usize) -> Self {
        assert!(num_shards > 0);

        Self {
            num_hash_shards: Some(num_shards),
            ..self
        }
    }

    /// Sets the number of unique values the ordered index can hold before
    /// reallocating.
    pub fn initial_capacity(self, capacity: usize) -> Self {
        Self {
            initial_capacity: Some(capacity),
            ..self
        }
    }

    /// Builds a `UniqueStoreDictionary`.
    pub fn build(self) -> UniqueStoreDictionary {
        UniqueStoreDictionary::with_everything(
            self.comp,
            self.hash_dictionary,
            self.num_hash_shards.unwrap_or(DEFAULT_NUM_SHARDS),
            self.initial_capacity.unwrap_or(DEFAULT_INITIAL_CAPACITY),
        )
    }
}
