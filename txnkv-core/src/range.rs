use core::{
    fmt,
    ops::{
        Bound, Range, RangeBounds, RangeFrom, RangeFull, RangeInclusive, RangeTo, RangeToInclusive,
    },
};

use crate::Key;

/// How a key-bearing endpoint treats its own key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    Included,
    Excluded,
    Unbounded,
}

/// A pair of key bounds selecting a contiguous slice of the key space.
///
/// An unbounded start is the smallest key and an unbounded end the largest one. A range
/// whose bounds admit no key (start after end, or equal keys with either side excluded) is a
/// valid input that selects nothing; see [`BoundRange::is_empty`].
#[derive(Clone, PartialEq, Eq)]
pub struct BoundRange {
    pub from: Bound<Key>,
    pub to: Bound<Key>,
}

impl BoundRange {
    pub fn new(from: Bound<Key>, to: Bound<Key>) -> Self {
        Self { from, to }
    }

    /// The whole key space.
    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// Builds a range from raw endpoints. The key of an `Unbounded` side is ignored.
    pub fn from_parts(
        start: impl Into<Key>,
        start_kind: BoundKind,
        end: impl Into<Key>,
        end_kind: BoundKind,
    ) -> Self {
        Self::new(to_bound(start.into(), start_kind), to_bound(end.into(), end_kind))
    }

    /// Returns true when no key can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.from, &self.to) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Included(start), Bound::Included(end)) => start > end,
            (Bound::Included(start), Bound::Excluded(end))
            | (Bound::Excluded(start), Bound::Included(end))
            | (Bound::Excluded(start), Bound::Excluded(end)) => start >= end,
        }
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        let above = match &self.from {
            Bound::Unbounded => true,
            Bound::Included(start) => key >= start,
            Bound::Excluded(start) => key > start,
        };
        let below = match &self.to {
            Bound::Unbounded => true,
            Bound::Included(end) => key <= end,
            Bound::Excluded(end) => key < end,
        };
        above && below
    }

    pub fn into_inner(self) -> (Bound<Key>, Bound<Key>) {
        (self.from, self.to)
    }
}

fn to_bound(key: Key, kind: BoundKind) -> Bound<Key> {
    match kind {
        BoundKind::Included => Bound::Included(key),
        BoundKind::Excluded => Bound::Excluded(key),
        BoundKind::Unbounded => Bound::Unbounded,
    }
}

impl fmt::Debug for BoundRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.from {
            Bound::Included(k) => write!(f, "[{k}")?,
            Bound::Excluded(k) => write!(f, "({k}")?,
            Bound::Unbounded => write!(f, "(-inf")?,
        }
        f.write_str(", ")?;
        match &self.to {
            Bound::Included(k) => write!(f, "{k}]"),
            Bound::Excluded(k) => write!(f, "{k})"),
            Bound::Unbounded => write!(f, "+inf)"),
        }
    }
}

impl RangeBounds<Key> for BoundRange {
    fn start_bound(&self) -> Bound<&Key> {
        self.from.as_ref()
    }

    fn end_bound(&self) -> Bound<&Key> {
        self.to.as_ref()
    }
}

impl<T: Into<Key>> From<Range<T>> for BoundRange {
    fn from(range: Range<T>) -> Self {
        Self::new(
            Bound::Included(range.start.into()),
            Bound::Excluded(range.end.into()),
        )
    }
}

impl<T: Into<Key>> From<RangeInclusive<T>> for BoundRange {
    fn from(range: RangeInclusive<T>) -> Self {
        let (start, end) = range.into_inner();
        Self::new(Bound::Included(start.into()), Bound::Included(end.into()))
    }
}

impl<T: Into<Key>> From<RangeFrom<T>> for BoundRange {
    fn from(range: RangeFrom<T>) -> Self {
        Self::new(Bound::Included(range.start.into()), Bound::Unbounded)
    }
}

impl<T: Into<Key>> From<RangeTo<T>> for BoundRange {
    fn from(range: RangeTo<T>) -> Self {
        Self::new(Bound::Unbounded, Bound::Excluded(range.end.into()))
    }
}

impl<T: Into<Key>> From<RangeToInclusive<T>> for BoundRange {
    fn from(range: RangeToInclusive<T>) -> Self {
        Self::new(Bound::Unbounded, Bound::Included(range.end.into()))
    }
}

impl From<RangeFull> for BoundRange {
    fn from(_: RangeFull) -> Self {
        Self::all()
    }
}

impl<T: Into<Key>> From<(Bound<T>, Bound<T>)> for BoundRange {
    fn from((from, to): (Bound<T>, Bound<T>)) -> Self {
        Self::new(from.map(Into::into), to.map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_and_degenerate_ranges_are_empty() {
        assert!(BoundRange::from("c".."a").is_empty());
        assert!(BoundRange::from("a".."a").is_empty());
        assert!(!BoundRange::from("a"..="a").is_empty());
        assert!(BoundRange::from((Bound::Excluded("a"), Bound::Included("a"))).is_empty());
        assert!(!BoundRange::from(..).is_empty());
        assert!(!BoundRange::from("z"..).is_empty());
    }

    #[test]
    fn contains_follows_both_bounds() {
        let range = BoundRange::from_parts("b", BoundKind::Excluded, "d", BoundKind::Included);
        assert!(!range.contains_key(&"b".into()));
        assert!(range.contains_key(&"c".into()));
        assert!(range.contains_key(&"d".into()));
        assert!(!range.contains_key(&"da".into()));

        let tail = BoundRange::from_parts("", BoundKind::Unbounded, "b", BoundKind::Excluded);
        assert!(tail.contains_key(&Key::EMPTY));
        assert!(!tail.contains_key(&"b".into()));
    }

    #[test]
    fn debug_renders_interval_notation() {
        assert_eq!(format!("{:?}", BoundRange::from("a".."c")), "[a, c)");
        assert_eq!(format!("{:?}", BoundRange::all()), "(-inf, +inf)");
    }
}
