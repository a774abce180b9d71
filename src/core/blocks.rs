//! Contiguous block ranges
//!
//! A [`Blocks`] names a run of fixed-size blocks by its first index and its
//! length. Live allocations and free gaps are both described this way, and
//! relocations are expressed as migrations of a range's start.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A contiguous range of blocks
///
/// `stop` is the last block inside the range, `end` the first block after it.
/// A range with `count == 0` is empty: it never overlaps or contains anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Blocks {
    start: usize,
    count: usize,
}

impl Blocks {
    pub const EMPTY: Blocks = Blocks { start: 0, count: 0 };

    pub fn new(start: usize, count: usize) -> Self {
        Blocks { start, count }
    }

    /// Range covering `start..=stop`
    pub fn from_bounds(start: usize, stop: usize) -> Self {
        debug_assert!(stop >= start);
        Blocks {
            start,
            count: stop - start + 1,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Last block inside the range. Meaningless for an empty range.
    pub fn stop(&self) -> usize {
        self.start + self.count.saturating_sub(1)
    }

    /// First block past the range
    pub fn end(&self) -> usize {
        self.start + self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if this range contains a block index
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end()
    }

    /// Check if `other` lies entirely within this range
    pub fn contains_blocks(&self, other: &Blocks) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && other.start >= self.start
            && other.end() <= self.end()
    }

    /// Check if `[start, start + len)` shares at least one block with this range
    pub fn overlaps(&self, start: usize, len: usize) -> bool {
        if self.count == 0 || len == 0 {
            return false;
        }
        start < self.end() && self.start < start + len
    }

    pub fn overlaps_blocks(&self, other: &Blocks) -> bool {
        self.overlaps(other.start, other.count)
    }

    /// Intersection of the two ranges, if any
    pub fn get_overlap(&self, other: &Blocks) -> Option<Blocks> {
        if !self.overlaps_blocks(other) {
            return None;
        }
        let start = self.start.max(other.start);
        let end = self.end().min(other.end());
        Some(Blocks::new(start, end - start))
    }

    /// Blocks covered by exactly one of the two ranges, in ascending order
    ///
    /// Yields nothing for identical ranges, one range when the two share an
    /// edge, and two when one range sits strictly inside the other or when
    /// they partially overlap from opposite sides. Disjoint ranges come back
    /// unchanged.
    pub fn get_non_overlap(&self, other: &Blocks) -> Vec<Blocks> {
        let overlap = match self.get_overlap(other) {
            Some(overlap) => overlap,
            None => {
                let mut both: Vec<Blocks> = [*self, *other]
                    .into_iter()
                    .filter(|b| !b.is_empty())
                    .collect();
                both.sort_by_key(|b| b.start);
                return both;
            }
        };

        let mut result = Vec::with_capacity(2);
        let low = self.start.min(other.start);
        if low < overlap.start {
            result.push(Blocks::new(low, overlap.start - low));
        }
        let high = self.end().max(other.end());
        if overlap.end() < high {
            result.push(Blocks::new(overlap.end(), high - overlap.end()));
        }
        result
    }

    /// Check if this range directly abuts another (can be coalesced)
    pub fn is_adjacent(&self, other: &Blocks) -> bool {
        self.end() == other.start || other.end() == self.start
    }

    /// Coalesce two adjacent ranges
    pub fn coalesce(&self, other: &Blocks) -> Option<Blocks> {
        if !self.is_adjacent(other) {
            return None;
        }
        let start = self.start.min(other.start);
        let end = self.end().max(other.end());
        Some(Blocks::new(start, end - start))
    }

    /// Follow a relocation of `[old_start, old_start + old_len)` to `new_start`
    ///
    /// The range moves only when it lies entirely inside the old window and
    /// still fits inside `[new_start, new_start + new_len)` at the same
    /// relative offset. Returns whether `start` changed.
    pub fn maybe_migrate(
        &mut self,
        old_start: usize,
        old_len: usize,
        new_start: usize,
        new_len: usize,
    ) -> bool {
        if self.is_empty() || old_len == 0 || new_len == 0 {
            return false;
        }
        let window = Blocks::new(old_start, old_len);
        if !window.contains_blocks(self) {
            return false;
        }

        let offset = self.start - old_start;
        if offset + self.count > new_len {
            return false;
        }

        let target = new_start + offset;
        if target == self.start {
            return false;
        }
        self.start = target;
        true
    }

    pub(crate) fn set_count(&mut self, count: usize) {
        self.count = count;
    }
}

impl fmt::Display for Blocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_bounds() {
        let b = Blocks::new(10, 20);
        assert_eq!(b.start(), 10);
        assert_eq!(b.count(), 20);
        assert_eq!(b.stop(), 29);
        assert_eq!(b.end(), 30);
        assert_eq!(Blocks::from_bounds(10, 29), b);
    }

    #[test]
    fn test_contains_index() {
        let b = Blocks::new(10, 20);
        assert!(!b.contains(9));
        assert!(b.contains(10));
        assert!(b.contains(29));
        assert!(!b.contains(30));
        assert!(!Blocks::EMPTY.contains(0));
    }

    #[test]
    fn test_contains_blocks() {
        let outer = Blocks::new(10, 20);
        assert!(outer.contains_blocks(&Blocks::new(10, 20)));
        assert!(outer.contains_blocks(&Blocks::new(15, 5)));
        assert!(!outer.contains_blocks(&Blocks::new(5, 10)));
        assert!(!outer.contains_blocks(&Blocks::new(25, 10)));
        assert!(!outer.contains_blocks(&Blocks::new(15, 0)));
    }

    #[test]
    fn test_overlaps() {
        let b = Blocks::new(10, 10);
        assert!(b.overlaps(0, 11));
        assert!(b.overlaps(19, 5));
        assert!(!b.overlaps(0, 10));
        assert!(!b.overlaps(20, 5));
    }

    #[test]
    fn test_zero_length_never_overlaps() {
        assert!(!Blocks::new(58, 1).overlaps(12507, 14));
        assert!(!Blocks::new(58, 1).overlaps(58, 0));
        assert!(!Blocks::new(58, 0).overlaps(50, 14));
        assert!(!Blocks::new(12507, 14).overlaps(12510, 0));
    }

    #[test]
    fn test_get_overlap() {
        let b = Blocks::new(10, 90);
        let overlap = b.get_overlap(&Blocks::new(0, 20)).unwrap();
        assert_eq!((overlap.start(), overlap.stop()), (10, 19));

        // Symmetric
        assert_eq!(Blocks::new(0, 20).get_overlap(&b), Some(overlap));
    }

    #[test]
    fn test_adjacent_is_not_overlap() {
        assert_eq!(Blocks::new(136, 11).get_overlap(&Blocks::new(125, 11)), None);
        assert_eq!(Blocks::new(125, 11).get_overlap(&Blocks::new(136, 11)), None);
    }

    #[test]
    fn test_get_non_overlap() {
        let parts = Blocks::new(10, 90).get_non_overlap(&Blocks::new(0, 20));
        let bounds: Vec<usize> = parts.iter().flat_map(|b| [b.start(), b.stop()]).collect();
        assert_eq!(bounds, vec![0, 9, 20, 99]);
    }

    #[test]
    fn test_get_non_overlap_shapes() {
        let b = Blocks::new(10, 10);
        assert!(b.get_non_overlap(&Blocks::new(10, 10)).is_empty());
        assert_eq!(
            b.get_non_overlap(&Blocks::new(10, 5)),
            vec![Blocks::new(15, 5)]
        );
        assert_eq!(
            b.get_non_overlap(&Blocks::new(12, 3)),
            vec![Blocks::new(10, 2), Blocks::new(15, 5)]
        );
        assert_eq!(
            b.get_non_overlap(&Blocks::new(40, 2)),
            vec![Blocks::new(10, 10), Blocks::new(40, 2)]
        );
    }

    #[test]
    fn test_coalesce() {
        let a = Blocks::new(10, 10);
        let b = Blocks::new(20, 10);
        assert!(a.is_adjacent(&b));
        assert_eq!(a.coalesce(&b), Some(Blocks::new(10, 20)));
        assert_eq!(a.coalesce(&Blocks::new(31, 1)), None);
    }

    #[test]
    fn test_migrate_whole_range() {
        let mut b = Blocks::new(15, 20);
        assert!(b.maybe_migrate(15, 20, 30, 20));
        assert_eq!(b.start(), 30);
        assert_eq!(b.count(), 20);
    }

    #[test]
    fn test_migrate_inside_window() {
        let mut b = Blocks::new(20, 5);
        assert!(b.maybe_migrate(15, 20, 0, 20));
        assert_eq!(b, Blocks::new(5, 5));
    }

    #[test]
    fn test_migrate_disjoint_is_noop() {
        let mut b = Blocks::new(100, 5);
        assert!(!b.maybe_migrate(15, 20, 30, 20));
        assert_eq!(b, Blocks::new(100, 5));
    }

    #[test]
    fn test_migrate_partial_overlap_is_noop() {
        let mut b = Blocks::new(0, 2);
        assert!(!b.maybe_migrate(1, 666, 0, 666));
        assert_eq!(b, Blocks::new(0, 2));
    }

    #[test]
    fn test_migrate_does_not_fit_new_window() {
        let mut b = Blocks::new(18, 2);
        assert!(!b.maybe_migrate(10, 10, 40, 5));
        assert_eq!(b.start(), 18);
    }

    #[test]
    fn test_display() {
        assert_eq!(Blocks::new(58, 1).to_string(), "58:1");
    }
}
