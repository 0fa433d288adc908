use crate::bitmap::Mask;
use crate::error::JoinResult;
use std::fmt;
use std::hash::Hash;

/// Fixed-width key type accepted by the grouping primitives.
pub trait Key: Copy + Ord + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> Key for T where T: Copy + Ord + Hash + fmt::Debug + Send + Sync + 'static {}

/// Result of grouping a key array.
///
/// `permutation` stable-sorts the keys, so `keys[permutation[..]]` is a sequence of contiguous
/// equal runs. Run `g` starts at `segments[g]` in that sorted order and carries
/// `unique_keys[g]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grouping<K> {
    pub unique_keys: Vec<K>,
    pub segments: Vec<usize>,
    pub permutation: Vec<usize>,
}

impl<K: Key> Grouping<K> {
    /// Number of grouped elements.
    pub fn len(&self) -> usize {
        self.permutation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permutation.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.unique_keys.len()
    }

    /// Segment offsets followed by a sentinel equal to [`Grouping::len`], so group `g` spans
    /// `bounds[g]..bounds[g + 1]`.
    pub fn segment_bounds(&self) -> Vec<usize> {
        let mut bounds = Vec::with_capacity(self.segments.len() + 1);
        bounds.extend_from_slice(&self.segments);
        bounds.push(self.len());
        bounds
    }

    /// Number of elements in each group.
    pub fn counts(&self) -> Vec<usize> {
        self.segment_bounds()
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect()
    }
}

/// Result of aligning a left key array against the domain of a right key array.
///
/// Codes are zero-based and dense over the right side's distinct values: every code in
/// `0..domain_size` occurs at least once in `dense_right`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alignment {
    /// Bit `i` is set when `left[i]` occurs in `right`.
    pub keep: Mask,
    /// Codes of the kept left positions, in original order.
    pub dense_left: Vec<usize>,
    /// Codes of every right position.
    pub dense_right: Vec<usize>,
    pub domain_size: usize,
}

/// Bulk-array capabilities the join engine is composed from.
///
/// Implementations may run at any scale; the engine only relies on the contracts documented on
/// each method and never proceeds before a call has returned.
pub trait GroupedDomain {
    /// Stable-sort `keys` and report unique keys, segment starts and the sorting permutation.
    fn group_by<K: Key>(&self, keys: &[K]) -> Grouping<K>;

    /// Expand one value per group across `size` positions.
    ///
    /// Position `i` (or `permutation[i]` when a permutation is supplied) receives `values[g]`
    /// where `g` is the group whose segment covers `i`. `segments` must be ascending and start
    /// at zero when non-empty.
    fn broadcast<T: Clone + Send + Sync>(
        &self,
        segments: &[usize],
        values: &[T],
        size: usize,
        permutation: Option<&[usize]>,
    ) -> JoinResult<Vec<T>>;

    /// Map `left` and `right` into the dense code space of `right`'s distinct values.
    fn align<K: Key>(&self, left: &[K], right: &[K]) -> Alignment;
}
