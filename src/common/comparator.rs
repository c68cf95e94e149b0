use super::entry_ref::EntryRef;

/// Compares and hashes values held in an external value arena through their
/// [`EntryRef`]s.
///
/// A comparator may carry a probe value (the value being looked up or about to
/// be inserted). The invalid ref, `EntryRef::default()`, stands for that probe
/// value in every method, so a single comparator can compare the probe against
/// stored refs as well as stored refs against each other.
///
/// Implementations must be consistent: `equal(a, b)` implies
/// `hash(a) == hash(b)`, and `less` must be a strict weak ordering that agrees
/// with `equal` (`!less(a, b) && !less(b, a)` iff `equal(a, b)`).
pub trait EntryComparator {
    fn less(&self, lhs: EntryRef, rhs: EntryRef) -> bool;

    fn equal(&self, lhs: EntryRef, rhs: EntryRef) -> bool;

    fn hash(&self, entry_ref: EntryRef) -> u64;
}

impl<C: EntryComparator + ?Sized> EntryComparator for &C {
    fn less(&self, lhs: EntryRef, rhs: EntryRef) -> bool {
        (**self).less(lhs, rhs)
    }

    fn equal(&self, lhs: EntryRef, rhs: EntryRef) -> bool {
        (**self).equal(lhs, rhs)
    }

    fn hash(&self, entry_ref: EntryRef) -> u64 {
        (**self).hash(entry_ref)
    }
}
