//! Pre-flight sizing for unfiltered equi-joins.

use crate::domain::{GroupedDomain, Key};
use crate::kernels::in1d;
use crate::memory::InMemoryDomain;

/// Bytes charged per joined row: three machine words (two index columns plus bookkeeping).
pub const DEFAULT_BYTES_PER_ROW: u64 = 3 * std::mem::size_of::<u64>() as u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EstimatorOptions {
    pub bytes_per_row: u64,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            bytes_per_row: DEFAULT_BYTES_PER_ROW,
        }
    }
}

/// Predicted size of an unfiltered equi-join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JoinSize {
    /// Number of matching `(left, right)` pairs.
    pub elements: u64,
    pub bytes: u64,
}

/// Size of the unfiltered inner join of `a` and `b` without running it.
///
/// This is advisory: nothing in the join engine consults it. Callers that join at scale should
/// check it before committing memory to [`crate::EquiJoin::inner_join`].
pub fn estimate_join_size<D, K>(domain: &D, a: &[K], b: &[K], options: EstimatorOptions) -> JoinSize
where
    D: GroupedDomain,
    K: Key,
{
    let by_a = domain.group_by(a);
    let by_b = domain.group_by(b);

    // Unique keys come back sorted, so the shared keys line up in the same order on both sides.
    let shared_a = in1d(&by_a.unique_keys, &by_b.unique_keys).compress(&by_a.counts());
    let shared_b = in1d(&by_b.unique_keys, &by_a.unique_keys).compress(&by_b.counts());
    debug_assert_eq!(shared_a.len(), shared_b.len());

    let elements = shared_a
        .iter()
        .zip(&shared_b)
        .fold(0u64, |acc, (&ca, &cb)| {
            acc.saturating_add((ca as u64).saturating_mul(cb as u64))
        });
    let bytes = elements.saturating_mul(options.bytes_per_row);

    log::debug!(
        "estimated join of {} x {} rows: {elements} pairs, {bytes} bytes",
        a.len(),
        b.len()
    );

    JoinSize { elements, bytes }
}

/// [`estimate_join_size`] on an [`InMemoryDomain`] with default options.
pub fn compute_join_size<K: Key>(a: &[K], b: &[K]) -> JoinSize {
    estimate_join_size(&InMemoryDomain::default(), a, b, EstimatorOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn multiplies_shared_counts() {
        let size = estimate_join_size(
            &InMemoryDomain::new(),
            &[1i64, 1, 2],
            &[1, 2, 2],
            EstimatorOptions::default(),
        );
        assert_eq!(size.elements, 4);
        assert_eq!(size.bytes, 4 * 24);
    }

    #[test]
    fn disjoint_or_empty_inputs_estimate_zero() {
        let domain = InMemoryDomain::new();
        let options = EstimatorOptions::default();
        assert_eq!(
            estimate_join_size(&domain, &[1u32, 2, 3], &[4, 5, 6], options),
            JoinSize::default()
        );
        assert_eq!(
            estimate_join_size::<_, u32>(&domain, &[], &[4], options),
            JoinSize::default()
        );
    }

    #[test]
    fn bytes_per_row_is_overridable() {
        let size = estimate_join_size(
            &InMemoryDomain::new(),
            &[7i64, 7, 8, 9],
            &[7, 9, 9, 9, 10],
            EstimatorOptions { bytes_per_row: 16 },
        );
        assert_eq!(size.elements, 2 + 3);
        assert_eq!(size.bytes, 80);
    }
}
