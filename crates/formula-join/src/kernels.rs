//! Small bulk kernels shared by the range generator, the estimator and the join engine.

use crate::bitmap::Mask;
use crate::domain::Key;
use ahash::AHashSet;

/// Exclusive prefix sum of `lengths`, returned together with the grand total.
pub(crate) fn exclusive_cumsum(lengths: &[usize]) -> (Vec<usize>, usize) {
    let mut offsets = Vec::with_capacity(lengths.len());
    let mut total = 0usize;
    for &len in lengths {
        offsets.push(total);
        total += len;
    }
    (offsets, total)
}

/// `values[indices[i]]` for every `i`.
pub(crate) fn gather<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&idx| values[idx].clone()).collect()
}

/// Set-membership test: bit `i` is set when `values[i]` occurs anywhere in `set`.
pub(crate) fn in1d<K: Key>(values: &[K], set: &[K]) -> Mask {
    let lookup: AHashSet<K> = set.iter().copied().collect();
    values.iter().map(|v| lookup.contains(v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_cumsum_reports_total() {
        assert_eq!(exclusive_cumsum(&[3, 2, 4]), (vec![0, 3, 5], 9));
        assert_eq!(exclusive_cumsum(&[]), (vec![], 0));
    }

    #[test]
    fn in1d_marks_members() {
        let mask = in1d(&[1i64, 5, 2, 9], &[2, 1, 1]);
        assert_eq!(mask.ones().collect::<Vec<_>>(), vec![0, 2]);
    }
}
