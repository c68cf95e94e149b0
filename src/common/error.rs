/// The error type for the fallible operations of the hash maps and the
/// dictionary.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A [`FixedSizeHashMap`][fixed-map] has no unused node slot and an empty
    /// free list.
    ///
    /// The caller must build a larger map (for example with
    /// [`FixedSizeHashMap::from_existing`][from-existing]) before adding more
    /// entries. Nothing was inserted and the entry producer was not called.
    ///
    /// [fixed-map]: ./hash/struct.FixedSizeHashMap.html
    /// [from-existing]: ./hash/struct.FixedSizeHashMap.html#method.from_existing
    #[error("The fixed size hash map is full (capacity: {capacity})")]
    HashMapFull { capacity: u32 },

    /// A bulk build was given a different number of refs than ref counts or
    /// payloads. The dictionary is left untouched.
    #[error("Bulk build needs one value per ref (refs: {refs}, values: {values})")]
    BuildLengthMismatch { refs: usize, values: usize },
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn error_display() {
        assert_eq!(
            "The fixed size hash map is full (capacity: 4)",
            Error::HashMapFull { capacity: 4 }.to_string()
        );
        assert_eq!(
            "Bulk build needs one value per ref (refs: 3, values: 2)",
            Error::BuildLengthMismatch { refs: 3, values: 2 }.to_string()
        );
    }
}
