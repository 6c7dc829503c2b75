//! Strongly-typed identifiers for field time-steps.

use std::fmt;

/// Monotonic load sequence number of a field snapshot.
///
/// Every snapshot produced by the loader receives the next index, so the
/// window's slots can be ordered even when the underlying frame list is
/// replayed cyclically and the same source frame is read more than once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeIndex(pub u64);

impl TimeIndex {
    /// The index that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TimeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl From<u64> for TimeIndex {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_is_strictly_greater() {
        let t = TimeIndex(41);
        assert_eq!(t.next(), TimeIndex(42));
        assert!(t < t.next());
    }

    #[test]
    fn display_prefixes_t() {
        assert_eq!(TimeIndex(7).to_string(), "t7");
    }
}
