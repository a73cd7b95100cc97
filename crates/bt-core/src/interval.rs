//! Interval sets with union, intersection and emptiness.
//!
//! Each [`Interval`] tracks whether its bounds are closed, so a state
//! occurrence `[start, stop)` and a point occurrence `[t, t]` live in the same
//! algebra. An [`IntervalSet`] always holds sorted, disjoint, non-adjacent
//! pieces.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitAnd, BitOr};

use rust_decimal::Decimal;
use serde::Serialize;

/// One connected interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Interval {
    pub lower: Decimal,
    pub upper: Decimal,
    pub lower_closed: bool,
    pub upper_closed: bool,
}

impl Interval {
    pub const fn new(
        lower: Decimal,
        upper: Decimal,
        lower_closed: bool,
        upper_closed: bool,
    ) -> Self {
        Self {
            lower,
            upper,
            lower_closed,
            upper_closed,
        }
    }

    /// `[lower, upper)`
    pub const fn closed_open(lower: Decimal, upper: Decimal) -> Self {
        Self::new(lower, upper, true, false)
    }

    /// `[lower, upper]`
    pub const fn closed(lower: Decimal, upper: Decimal) -> Self {
        Self::new(lower, upper, true, true)
    }

    /// `[t, t]`
    pub const fn singleton(t: Decimal) -> Self {
        Self::closed(t, t)
    }

    pub fn is_empty(&self) -> bool {
        match self.lower.cmp(&self.upper) {
            Ordering::Greater => true,
            Ordering::Equal => !(self.lower_closed && self.upper_closed),
            Ordering::Less => false,
        }
    }

    pub fn length(&self) -> Decimal {
        if self.is_empty() {
            Decimal::ZERO
        } else {
            self.upper - self.lower
        }
    }

    pub fn contains(&self, t: Decimal) -> bool {
        let above = if self.lower_closed {
            t >= self.lower
        } else {
            t > self.lower
        };
        let below = if self.upper_closed {
            t <= self.upper
        } else {
            t < self.upper
        };
        above && below
    }

    /// Pairwise intersection; may be empty.
    pub fn intersection(&self, other: &Self) -> Self {
        let (lower, lower_closed) = match self.lower.cmp(&other.lower) {
            Ordering::Greater => (self.lower, self.lower_closed),
            Ordering::Less => (other.lower, other.lower_closed),
            Ordering::Equal => (self.lower, self.lower_closed && other.lower_closed),
        };
        let (upper, upper_closed) = match self.upper.cmp(&other.upper) {
            Ordering::Less => (self.upper, self.upper_closed),
            Ordering::Greater => (other.upper, other.upper_closed),
            Ordering::Equal => (self.upper, self.upper_closed && other.upper_closed),
        };
        Self::new(lower, upper, lower_closed, upper_closed)
    }

    /// Whether `next` (starting at or after `self`) overlaps or touches `self`
    /// without a gap.
    fn joins(&self, next: &Self) -> bool {
        match next.lower.cmp(&self.upper) {
            Ordering::Less => true,
            Ordering::Equal => self.upper_closed || next.lower_closed,
            Ordering::Greater => false,
        }
    }

    /// Ordering of lower bounds; a closed bound starts earlier than an open one.
    fn cmp_lower(&self, other: &Self) -> Ordering {
        self.lower
            .cmp(&other.lower)
            .then_with(|| other.lower_closed.cmp(&self.lower_closed))
    }

    /// Ordering of upper bounds; an open bound ends earlier than a closed one.
    fn cmp_upper(&self, other: &Self) -> Ordering {
        self.upper
            .cmp(&other.upper)
            .then_with(|| self.upper_closed.cmp(&other.upper_closed))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{},{}{}",
            if self.lower_closed { '[' } else { '(' },
            self.lower,
            self.upper,
            if self.upper_closed { ']' } else { ')' }
        )
    }
}

/// A union of disjoint intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct IntervalSet {
    pieces: Vec<Interval>,
}

impl IntervalSet {
    pub const fn empty() -> Self {
        Self { pieces: Vec::new() }
    }

    /// Normalize arbitrary intervals into sorted disjoint pieces.
    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let mut sorted: Vec<Interval> = intervals.into_iter().filter(|i| !i.is_empty()).collect();
        sorted.sort_by(Interval::cmp_lower);

        let mut pieces: Vec<Interval> = Vec::with_capacity(sorted.len());
        for interval in sorted {
            if let Some(last) = pieces.last_mut() {
                if last.joins(&interval) {
                    if interval.cmp_upper(last) == Ordering::Greater {
                        last.upper = interval.upper;
                        last.upper_closed = interval.upper_closed;
                    }
                    continue;
                }
            }
            pieces.push(interval);
        }

        Self { pieces }
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Disjoint pieces in ascending order.
    pub fn pieces(&self) -> &[Interval] {
        &self.pieces
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.pieces.iter()
    }

    pub fn contains(&self, t: Decimal) -> bool {
        self.pieces.iter().any(|p| p.contains(t))
    }

    /// Sum of piece lengths.
    pub fn total_length(&self) -> Decimal {
        self.pieces.iter().map(Interval::length).sum()
    }

    pub fn lower(&self) -> Option<Decimal> {
        self.pieces.first().map(|p| p.lower)
    }

    pub fn upper(&self) -> Option<Decimal> {
        self.pieces.last().map(|p| p.upper)
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::from_intervals(self.pieces.iter().chain(other.pieces.iter()).copied())
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.pieces.len() && j < other.pieces.len() {
            let a = &self.pieces[i];
            let b = &other.pieces[j];
            let piece = a.intersection(b);
            if !piece.is_empty() {
                out.push(piece);
            }
            if a.cmp_upper(b) == Ordering::Greater {
                j += 1;
            } else {
                i += 1;
            }
        }
        Self::from_intervals(out)
    }

    /// Restrict to `[min, max]`.
    #[must_use]
    pub fn clip(&self, min: Decimal, max: Decimal) -> Self {
        self.intersection(&Self::from(Interval::closed(min, max)))
    }
}

impl From<Interval> for IntervalSet {
    fn from(interval: Interval) -> Self {
        Self::from_intervals([interval])
    }
}

impl FromIterator<Interval> for IntervalSet {
    fn from_iter<T: IntoIterator<Item = Interval>>(iter: T) -> Self {
        Self::from_intervals(iter)
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.pieces.iter()
    }
}

impl BitOr for &IntervalSet {
    type Output = IntervalSet;

    fn bitor(self, rhs: Self) -> IntervalSet {
        self.union(rhs)
    }
}

impl BitAnd for &IntervalSet {
    type Output = IntervalSet;

    fn bitand(self, rhs: Self) -> IntervalSet {
        self.intersection(rhs)
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pieces.is_empty() {
            return f.write_str("()");
        }
        for (n, piece) in self.pieces.iter().enumerate() {
            if n > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{piece}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn co(a: Decimal, b: Decimal) -> IntervalSet {
        IntervalSet::from(Interval::closed_open(a, b))
    }

    #[test]
    fn adjacent_closed_open_pieces_merge() {
        let set = &co(dec!(0), dec!(5)) | &co(dec!(5), dec!(9));
        assert_eq!(set.pieces(), &[Interval::closed_open(dec!(0), dec!(9))]);
    }

    #[test]
    fn touching_closed_open_pieces_do_not_intersect() {
        let rest = co(dec!(0), dec!(5));
        let feed = co(dec!(5), dec!(9));
        assert!((&rest & &feed).is_empty());
    }

    #[test]
    fn singleton_on_open_bound_is_outside() {
        let point = IntervalSet::from(Interval::singleton(dec!(5)));
        assert!((&co(dec!(0), dec!(5)) & &point).is_empty());
        assert_eq!(
            (&co(dec!(5), dec!(9)) & &point).pieces(),
            &[Interval::singleton(dec!(5))]
        );
    }

    #[test]
    fn open_gap_between_pieces_is_preserved() {
        let left = IntervalSet::from(Interval::new(dec!(0), dec!(2), true, false));
        let right = IntervalSet::from(Interval::new(dec!(2), dec!(4), false, true));
        let union = &left | &right;
        assert_eq!(union.pieces().len(), 2);
        assert!(!union.contains(dec!(2)));
        assert_eq!(union.total_length(), dec!(4));
    }

    #[test]
    fn intersection_of_overlaps_has_expected_pieces() {
        let a = IntervalSet::from_intervals([
            Interval::closed_open(dec!(0), dec!(4)),
            Interval::closed_open(dec!(6), dec!(10)),
        ]);
        let b = co(dec!(2), dec!(8));
        let both = &a & &b;
        assert_eq!(
            both.pieces(),
            &[
                Interval::closed_open(dec!(2), dec!(4)),
                Interval::closed_open(dec!(6), dec!(8)),
            ]
        );
        assert_eq!(both.total_length(), dec!(4));
        assert_eq!(both.to_string(), "[2,4) | [6,8)");
    }

    #[test]
    fn clip_keeps_points_on_bounds() {
        let set = IntervalSet::from_intervals([
            Interval::singleton(dec!(10)),
            Interval::closed_open(dec!(8), dec!(12)),
        ]);
        let clipped = set.clip(dec!(0), dec!(10));
        assert_eq!(clipped.pieces(), &[Interval::closed(dec!(8), dec!(10))]);
    }

    #[test]
    fn empty_set_is_identity_for_union() {
        let a = co(dec!(1), dec!(2));
        assert_eq!(&a | &IntervalSet::empty(), a);
        assert!((&a & &IntervalSet::empty()).is_empty());
        assert_eq!(IntervalSet::empty().to_string(), "()");
    }

    fn arb_interval() -> impl Strategy<Value = Interval> {
        (0i64..40, 0i64..8, any::<bool>(), any::<bool>()).prop_map(|(start, len, lc, uc)| {
            Interval::new(
                Decimal::new(start, 1),
                Decimal::new(start + len, 1),
                lc,
                uc,
            )
        })
    }

    fn arb_set() -> impl Strategy<Value = IntervalSet> {
        prop::collection::vec(arb_interval(), 0..6).prop_map(IntervalSet::from_intervals)
    }

    /// Sample points on a 0.05 grid covering every bound used above.
    fn sample_points() -> impl Iterator<Item = Decimal> {
        (0..=100).map(|n| Decimal::new(n * 5, 2))
    }

    proptest! {
        #[test]
        fn intersection_distributes_over_union(a in arb_set(), b in arb_set(), c in arb_set()) {
            let left = &(&a | &b) & &c;
            let right = &(&a & &c) | &(&b & &c);
            prop_assert_eq!(left, right);
        }

        #[test]
        fn intersection_empty_iff_no_shared_point(a in arb_set(), b in arb_set()) {
            let shares = sample_points().any(|t| a.contains(t) && b.contains(t));
            prop_assert_eq!((&a & &b).is_empty(), !shares);
        }

        #[test]
        fn pieces_are_sorted_and_disjoint(a in arb_set()) {
            for pair in a.pieces().windows(2) {
                prop_assert!(!pair[0].joins(&pair[1]));
                prop_assert!(pair[0].upper <= pair[1].lower);
            }
        }

        #[test]
        fn membership_matches_set_operations(a in arb_set(), b in arb_set()) {
            let union = &a | &b;
            let inter = &a & &b;
            for t in sample_points() {
                prop_assert_eq!(union.contains(t), a.contains(t) || b.contains(t));
                prop_assert_eq!(inter.contains(t), a.contains(t) && b.contains(t));
            }
        }
    }
}
