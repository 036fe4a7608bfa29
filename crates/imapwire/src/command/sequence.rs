//! Sequence sets for message ranges.

use std::ops::{RangeFrom, RangeInclusive};

/// Upper end of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEnd {
    /// A concrete message number or UID.
    Number(u32),
    /// The largest number in use (`*`).
    Unbounded,
}

/// Sequence set for specifying messages by number or UID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// One message. Fetches addressed this way return only that message.
    Single(u32),
    /// Range of messages (inclusive).
    Range(u32, u32),
    /// Range from start to the end of the mailbox.
    RangeFrom(u32),
    /// Explicit list of messages.
    List(Vec<u32>),
}

impl SequenceSet {
    /// Every message in the mailbox (`1:*`).
    #[must_use]
    pub const fn all() -> Self {
        Self::RangeFrom(1)
    }

    /// Returns true when a single message is addressed on its own rather than
    /// as a one-element list or range.
    #[must_use]
    pub const fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    /// Returns true if `id` is covered by this set.
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        match self {
            Self::Single(n) => *n == id,
            Self::Range(start, end) => (*start..=*end).contains(&id),
            Self::RangeFrom(start) => id >= *start,
            Self::List(ids) => ids.contains(&id),
        }
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::List(ids) => {
                let s: Vec<_> = ids.iter().map(ToString::to_string).collect();
                write!(f, "{}", s.join(","))
            }
        }
    }
}

impl From<u32> for SequenceSet {
    fn from(id: u32) -> Self {
        Self::Single(id)
    }
}

impl From<Vec<u32>> for SequenceSet {
    fn from(ids: Vec<u32>) -> Self {
        Self::List(ids)
    }
}

impl From<&[u32]> for SequenceSet {
    fn from(ids: &[u32]) -> Self {
        Self::List(ids.to_vec())
    }
}

impl<const N: usize> From<[u32; N]> for SequenceSet {
    fn from(ids: [u32; N]) -> Self {
        Self::List(ids.to_vec())
    }
}

impl From<RangeInclusive<u32>> for SequenceSet {
    fn from(range: RangeInclusive<u32>) -> Self {
        Self::Range(*range.start(), *range.end())
    }
}

impl From<RangeFrom<u32>> for SequenceSet {
    fn from(range: RangeFrom<u32>) -> Self {
        Self::RangeFrom(range.start)
    }
}

/// Builds a set from a start and an optional end: `5`, `5:10` or `5:*`.
#[must_use]
pub const fn build_set(from: u32, to: Option<RangeEnd>) -> SequenceSet {
    match to {
        None => SequenceSet::Single(from),
        Some(RangeEnd::Number(to)) => SequenceSet::Range(from, to),
        Some(RangeEnd::Unbounded) => SequenceSet::RangeFrom(from),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_build_set() {
        assert_eq!(build_set(5, None).to_string(), "5");
        assert_eq!(build_set(5, Some(RangeEnd::Number(10))).to_string(), "5:10");
        assert_eq!(build_set(5, Some(RangeEnd::Unbounded)).to_string(), "5:*");
    }

    #[test]
    fn test_list_display() {
        assert_eq!(SequenceSet::from(vec![1, 4, 9]).to_string(), "1,4,9");
        assert_eq!(SequenceSet::from([7]).to_string(), "7");
        assert!(!SequenceSet::from([7]).is_single());
        assert!(SequenceSet::from(7).is_single());
    }

    #[test]
    fn test_range_conversions() {
        assert_eq!(SequenceSet::from(2..=8).to_string(), "2:8");
        assert_eq!(SequenceSet::from(3..).to_string(), "3:*");
        assert_eq!(SequenceSet::all().to_string(), "1:*");
    }

    #[test]
    fn test_contains() {
        assert!(SequenceSet::from(2..=8).contains(8));
        assert!(!SequenceSet::from(2..=8).contains(9));
        assert!(SequenceSet::from(3..).contains(u32::MAX));
        assert!(SequenceSet::from(vec![1, 5]).contains(5));
    }

    proptest! {
        #[test]
        fn prop_build_set_shapes(from in 1u32.., to in 1u32..) {
            prop_assert_eq!(build_set(from, None).to_string(), from.to_string());
            prop_assert_eq!(
                build_set(from, Some(RangeEnd::Number(to))).to_string(),
                format!("{from}:{to}")
            );
            prop_assert_eq!(
                build_set(from, Some(RangeEnd::Unbounded)).to_string(),
                format!("{from}:*")
            );
        }
    }
}
