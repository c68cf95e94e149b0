pub(crate) mod comparator;
pub(crate) mod constants;
pub(crate) mod entry_ref;
pub(crate) mod error;
pub(crate) mod generation;
pub(crate) mod memory_usage;

#[cfg(test)]
pub(crate) mod test_utils;
