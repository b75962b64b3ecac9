//! Ordered, coalesced sets of 32-bit identifiers.
//!
//! A [`RangeSet`] stores UIDs or sequence numbers as sorted inclusive
//! `low..=high` pairs. Overlapping and adjacent pairs are merged on insert,
//! so the representation of a given set of values is unique.

/// Inclusive range of identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdRange {
    /// First identifier in the range.
    pub low: u32,
    /// Last identifier in the range (inclusive).
    pub high: u32,
}

impl IdRange {
    /// Creates a range, returning `None` if `low > high`.
    #[must_use]
    pub const fn new(low: u32, high: u32) -> Option<Self> {
        if low > high {
            None
        } else {
            Some(Self { low, high })
        }
    }

    /// Creates a range holding a single identifier.
    #[must_use]
    pub const fn single(id: u32) -> Self {
        Self { low: id, high: id }
    }

    /// Number of identifiers in the range.
    #[must_use]
    pub const fn len(self) -> u64 {
        self.high as u64 - self.low as u64 + 1
    }

    /// Always false; ranges hold at least one identifier.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        false
    }

    /// Returns true if `id` falls inside the range.
    #[must_use]
    pub const fn contains(self, id: u32) -> bool {
        self.low <= id && id <= self.high
    }
}

impl std::fmt::Display for IdRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.low == self.high {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}:{}", self.low, self.high)
        }
    }
}

/// Ordered set of identifiers stored as coalesced ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeSet {
    ranges: Vec<IdRange>,
}

impl RangeSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Creates an empty set with room for `capacity` ranges.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ranges: Vec::with_capacity(capacity),
        }
    }

    /// Adds a single identifier.
    pub fn insert(&mut self, id: u32) {
        self.insert_range(IdRange::single(id));
    }

    /// Adds every identifier of `range`, merging with neighbours.
    pub fn insert_range(&mut self, range: IdRange) {
        // First stored range that could touch the new one: its high end is
        // at least `range.low - 1`.
        let start = self
            .ranges
            .partition_point(|r| r.high.saturating_add(1) < range.low);

        let mut low = range.low;
        let mut high = range.high;
        let mut end = start;
        while end < self.ranges.len() && self.ranges[end].low <= high.saturating_add(1) {
            low = low.min(self.ranges[end].low);
            high = high.max(self.ranges[end].high);
            end += 1;
        }
        self.ranges
            .splice(start..end, std::iter::once(IdRange { low, high }));
    }

    /// Removes a single identifier. Returns true if it was present.
    pub fn remove(&mut self, id: u32) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.remove_range(IdRange::single(id));
        true
    }

    /// Removes every identifier of `range`.
    pub fn remove_range(&mut self, range: IdRange) {
        let start = self.ranges.partition_point(|r| r.high < range.low);
        let mut end = start;
        while end < self.ranges.len() && self.ranges[end].low <= range.high {
            end += 1;
        }
        if start == end {
            return;
        }

        let mut kept = Vec::with_capacity(2);
        let first = self.ranges[start];
        let last = self.ranges[end - 1];
        if first.low < range.low {
            kept.push(IdRange {
                low: first.low,
                high: range.low - 1,
            });
        }
        if last.high > range.high {
            kept.push(IdRange {
                low: range.high + 1,
                high: last.high,
            });
        }
        self.ranges.splice(start..end, kept);
    }

    /// Returns true if `id` is in the set.
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        let idx = self.ranges.partition_point(|r| r.high < id);
        self.ranges.get(idx).is_some_and(|r| r.low <= id)
    }

    /// Total number of identifiers in the set.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.ranges.iter().map(|r| r.len()).sum()
    }

    /// Number of stored ranges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns true if the set holds no identifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Smallest identifier, if any.
    #[must_use]
    pub fn first(&self) -> Option<u32> {
        self.ranges.first().map(|r| r.low)
    }

    /// Largest identifier, if any.
    #[must_use]
    pub fn last(&self) -> Option<u32> {
        self.ranges.last().map(|r| r.high)
    }

    /// Returns the stored ranges in ascending order.
    #[must_use]
    pub fn ranges(&self) -> &[IdRange] {
        &self.ranges
    }

    /// Iterates over the stored ranges.
    pub fn iter(&self) -> impl Iterator<Item = IdRange> + '_ {
        self.ranges.iter().copied()
    }

    /// Iterates over every identifier in ascending order.
    pub fn iter_values(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|r| r.low..=r.high)
    }

    /// Removes every identifier.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}

impl FromIterator<u32> for RangeSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl FromIterator<IdRange> for RangeSet {
    fn from_iter<I: IntoIterator<Item = IdRange>>(iter: I) -> Self {
        let mut set = Self::new();
        for range in iter {
            set.insert_range(range);
        }
        set
    }
}

impl Extend<u32> for RangeSet {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        for id in iter {
            self.insert(id);
        }
    }
}

impl std::fmt::Display for RangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s: Vec<_> = self.ranges.iter().map(ToString::to_string).collect();
        write!(f, "{}", s.join(","))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    mod id_range_tests {
        use super::*;

        #[test]
        fn new_rejects_inverted() {
            assert!(IdRange::new(5, 4).is_none());
            assert_eq!(IdRange::new(4, 5).unwrap().len(), 2);
        }

        #[test]
        fn full_width_len() {
            assert_eq!(IdRange::new(0, u32::MAX).unwrap().len(), 1 << 32);
        }

        #[test]
        fn display() {
            assert_eq!(IdRange::single(7).to_string(), "7");
            assert_eq!(IdRange::new(1, 9).unwrap().to_string(), "1:9");
        }
    }

    mod range_set_tests {
        use super::*;

        #[test]
        fn adjacent_values_coalesce() {
            let set: RangeSet = [1, 2, 3, 5].into_iter().collect();
            assert_eq!(set.to_string(), "1:3,5");
            assert_eq!(set.count(), 4);
        }

        #[test]
        fn insert_bridges_gap() {
            let mut set: RangeSet = [1, 2, 5, 6].into_iter().collect();
            set.insert_range(IdRange::new(3, 4).unwrap());
            assert_eq!(set.ranges(), &[IdRange::new(1, 6).unwrap()]);
        }

        #[test]
        fn insert_overlapping_many() {
            let mut set: RangeSet = [1, 4, 8, 20].into_iter().collect();
            set.insert_range(IdRange::new(3, 9).unwrap());
            assert_eq!(set.to_string(), "1,3:9,20");
        }

        #[test]
        fn insert_at_u32_max() {
            let mut set = RangeSet::new();
            set.insert(u32::MAX);
            set.insert(u32::MAX - 1);
            assert_eq!(set.len(), 1);
            assert_eq!(set.last(), Some(u32::MAX));
        }

        #[test]
        fn remove_splits_range() {
            let mut set: RangeSet = (1..=10).collect();
            set.remove_range(IdRange::new(4, 6).unwrap());
            assert_eq!(set.to_string(), "1:3,7:10");
            assert!(set.remove(1));
            assert!(!set.remove(1));
            assert_eq!(set.to_string(), "2:3,7:10");
        }

        #[test]
        fn remove_spanning_ranges() {
            let mut set: RangeSet = [1, 2, 5, 6, 9, 10].into_iter().collect();
            set.remove_range(IdRange::new(2, 9).unwrap());
            assert_eq!(set.to_string(), "1,10");
        }

        #[test]
        fn contains() {
            let set: RangeSet = [2, 3, 9].into_iter().collect();
            assert!(!set.contains(1));
            assert!(set.contains(3));
            assert!(!set.contains(4));
            assert!(set.contains(9));
        }
    }

    proptest! {
        #[test]
        fn matches_btreeset(values in proptest::collection::vec(0u32..200, 0..100),
                            removed in proptest::collection::vec(0u32..200, 0..30)) {
            let mut set: RangeSet = values.iter().copied().collect();
            let mut model: std::collections::BTreeSet<u32> = values.into_iter().collect();
            for id in removed {
                prop_assert_eq!(set.remove(id), model.remove(&id));
            }
            prop_assert_eq!(set.iter_values().collect::<Vec<_>>(),
                            model.iter().copied().collect::<Vec<_>>());
            prop_assert_eq!(set.count(), model.len() as u64);
        }

        #[test]
        fn ranges_stay_disjoint_and_separated(values in proptest::collection::vec(0u32..500, 0..200)) {
            let set: RangeSet = values.into_iter().collect();
            for pair in set.ranges().windows(2) {
                prop_assert!(pair[0].high + 1 < pair[1].low);
            }
        }
    }
}
