/// Number of shards of the hash dictionary. Also used as the stripe count of
/// each shard's map, so that the bits selecting the shard are not reused to
/// select the bucket.
pub(crate) const DEFAULT_NUM_SHARDS: usize = 3;

// A shard starts with 2 buckets and room for 3 entries.
pub(crate) const INITIAL_SHARD_MODULO: u32 = 2;
pub(crate) const INITIAL_SHARD_CAPACITY: u32 = 3;

pub(crate) const DEFAULT_INITIAL_CAPACITY: usize = 0;
