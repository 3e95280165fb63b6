/// Failure of a single-key table operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableError {
    /// The table is at capacity and has no eviction policy.
    Full,
    NotFound,
    /// Any other errno returned by the map helper.
    Rejected(i64),
}

impl TableError {
    const E2BIG: i64 = 7;
    const ENOENT: i64 = 2;

    /// Classify a negative return value from a BPF map helper.
    #[inline(always)]
    pub fn from_errno(ret: i64) -> Self {
        match -ret {
            Self::E2BIG => TableError::Full,
            Self::ENOENT => TableError::NotFound,
            _ => TableError::Rejected(ret),
        }
    }
}

/// Read side of a fixed-capacity key/value table shared between execution
/// contexts.  Tables the data path only reads implement just this.
pub trait FlowLookup<K, V> {
    fn lookup(&self, key: &K) -> Option<V>;
}

/// A table the caller also writes.
///
/// Each operation is atomic for its key.  Sequences of operations are not:
/// callers that look up and then upsert must tolerate another context
/// writing the same key in between.
pub trait FlowTable<K, V>: FlowLookup<K, V> {
    /// Insert, or overwrite the value of an existing key.
    fn upsert(&self, key: &K, value: &V) -> Result<(), TableError>;

    fn remove(&self, key: &K) -> Result<(), TableError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_classification() {
        assert_eq!(TableError::from_errno(-7), TableError::Full);
        assert_eq!(TableError::from_errno(-2), TableError::NotFound);
        assert_eq!(TableError::from_errno(-22), TableError::Rejected(-22));
    }
}
