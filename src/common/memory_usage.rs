use std::ops::AddAssign;

/// Memory accounting of an index, in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Bytes reserved by the index.
    pub allocated_bytes: usize,
    /// Bytes holding live entries, or entries waiting on a hold list.
    pub used_bytes: usize,
    /// Bytes of freed slots ready for reuse.
    pub dead_bytes: usize,
    /// Bytes of slots waiting on a hold list.
    pub allocated_bytes_on_hold: usize,
}

impl MemoryUsage {
    pub fn merge(&mut self, other: &MemoryUsage) {
        *self += *other;
    }
}

impl AddAssign for MemoryUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.allocated_bytes += rhs.allocated_bytes;
        self.used_bytes += rhs.used_bytes;
        self.dead_bytes += rhs.dead_bytes;
        self.allocated_bytes_on_hold += rhs.allocated_bytes_on_hold;
    }
}
