//! Inner equi-join over integer keys.
//!
//! The join never builds the cross product of matching rows explicitly. Instead each left row
//! that survives alignment is mapped to the contiguous segment of the grouped right side holding
//! its key, and those `[start, end)` segments are flattened with [`gen_ranges`]. An optional
//! predicate is evaluated once over the flattened candidate batch; rows whose every candidate is
//! rejected disappear from the output instead of leaving an empty segment behind.

use crate::bitmap::Mask;
use crate::domain::{GroupedDomain, Key};
use crate::error::{JoinError, JoinResult, PredicateError};
use crate::kernels::gather;
use crate::memory::InMemoryDomain;
use crate::ranges::gen_ranges;

/// Rows of each auxiliary column fed to a predicate before the real evaluation.
pub const DEFAULT_SMOKE_TEST_ROWS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinOptions {
    /// Upper bound on the sample used to smoke-test a predicate. The sample is additionally capped
    /// by the lengths of both inputs.
    pub smoke_test_rows: usize,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            smoke_test_rows: DEFAULT_SMOKE_TEST_ROWS,
        }
    }
}

/// Matching index pairs: `left_keys[left[i]] == right_keys[right[i]]` for every `i`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JoinIndices {
    pub left: Vec<usize>,
    pub right: Vec<usize>,
}

impl JoinIndices {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.left.iter().copied().zip(self.right.iter().copied())
    }
}

/// A join filter: a predicate over two auxiliary columns parallel to the join keys.
///
/// The predicate receives equal-length batches of left and right values and must return a mask
/// of the same length. It may be called more than once, so it must not have side effects. Both an
/// `Err` return and a panic surface as [`JoinError::PredicateEvaluation`].
pub struct Where<'a, L, R, F> {
    left: &'a [L],
    right: &'a [R],
    predicate: F,
}

impl<'a, L, R, F> Where<'a, L, R, F>
where
    F: Fn(&[L], &[R]) -> Result<Mask, PredicateError>,
{
    pub fn new(left: &'a [L], right: &'a [R], predicate: F) -> Self {
        Self {
            left,
            right,
            predicate,
        }
    }

    /// Run the predicate on one batch. A panic inside the predicate (integer division by zero,
    /// an out-of-bounds index) is reported as an evaluation error like an `Err` return.
    fn evaluate(&self, left: &[L], right: &[R]) -> JoinResult<Mask> {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (self.predicate)(left, right)
        }))
        .unwrap_or_else(|payload| {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(format!("predicate panicked: {msg}").into())
        });
        let mask = outcome.map_err(JoinError::predicate)?;
        if mask.len() != left.len() {
            return Err(JoinError::predicate(format!(
                "predicate returned {} results for {} rows",
                mask.len(),
                left.len()
            )));
        }
        Ok(mask)
    }
}

/// Candidate pairs before any predicate is applied.
struct Candidates {
    /// Original indices of left rows present on the right side.
    rows: Vec<usize>,
    /// Start of each kept row's run in `right`.
    offsets: Vec<usize>,
    /// Right indices, grouped by kept row.
    right: Vec<usize>,
}

/// Equi-join engine over a [`GroupedDomain`].
#[derive(Clone, Copy, Debug)]
pub struct EquiJoin<'d, D> {
    domain: &'d D,
    options: JoinOptions,
}

impl<'d, D: GroupedDomain> EquiJoin<'d, D> {
    pub fn new(domain: &'d D) -> Self {
        Self::with_options(domain, JoinOptions::default())
    }

    pub fn with_options(domain: &'d D, options: JoinOptions) -> Self {
        Self { domain, options }
    }

    pub fn options(&self) -> JoinOptions {
        self.options
    }

    /// Every `(i, j)` with `left[i] == right[j]`.
    ///
    /// Left indices come out ascending; for each left row the right indices follow the stable
    /// grouping order of `right`, i.e. ascending as well.
    pub fn inner_join<K: Key>(&self, left: &[K], right: &[K]) -> JoinResult<JoinIndices> {
        let Some(candidates) = self.candidates(left, right)? else {
            return Ok(JoinIndices::default());
        };
        let left_inds = self.domain.broadcast(
            &candidates.offsets,
            &candidates.rows,
            candidates.right.len(),
            None,
        )?;
        Ok(JoinIndices {
            left: left_inds,
            right: candidates.right,
        })
    }

    /// Like [`EquiJoin::inner_join`], keeping only pairs accepted by `clause`.
    ///
    /// The clause's columns must be parallel to `left` and `right`. The predicate is run on a
    /// short prefix of both columns before any bulk work so a failing predicate is reported
    /// without paying for the join.
    pub fn inner_join_where<K, L, R, F>(
        &self,
        left: &[K],
        right: &[K],
        clause: Where<'_, L, R, F>,
    ) -> JoinResult<JoinIndices>
    where
        K: Key,
        L: Clone + Send + Sync,
        R: Clone,
        F: Fn(&[L], &[R]) -> Result<Mask, PredicateError>,
    {
        if clause.left.len() != left.len() {
            return Err(JoinError::shape(
                "left where-clause column",
                left.len(),
                clause.left.len(),
            ));
        }
        if clause.right.len() != right.len() {
            return Err(JoinError::shape(
                "right where-clause column",
                right.len(),
                clause.right.len(),
            ));
        }

        let sample = left
            .len()
            .min(right.len())
            .min(self.options.smoke_test_rows);
        clause.evaluate(&clause.left[..sample], &clause.right[..sample])?;

        let Some(candidates) = self.candidates(left, right)? else {
            return Ok(JoinIndices::default());
        };

        let right_values = gather(clause.right, &candidates.right);
        let left_values = self.domain.broadcast(
            &candidates.offsets,
            &gather(clause.left, &candidates.rows),
            candidates.right.len(),
            None,
        )?;
        let satisfied = clause.evaluate(&left_values, &right_values)?;

        let right_inds = satisfied.compress(&candidates.right);

        // Each row's new start is the number of accepted pairs before its old start.
        let scan = satisfied.exclusive_scan();
        let starts: Vec<usize> = candidates.offsets.iter().map(|&o| scan[o]).collect();
        let total = satisfied.count_ones();
        let non_empty: Mask = starts
            .iter()
            .enumerate()
            .map(|(row, &start)| starts.get(row + 1).copied().unwrap_or(total) > start)
            .collect();
        let offsets = non_empty.compress(&starts);
        let rows = non_empty.compress(&candidates.rows);

        log::debug!(
            "predicate kept {total} of {} candidate pairs across {} of {} left rows",
            satisfied.len(),
            rows.len(),
            candidates.rows.len()
        );

        let left_inds = self
            .domain
            .broadcast(&offsets, &rows, right_inds.len(), None)?;
        Ok(JoinIndices {
            left: left_inds,
            right: right_inds,
        })
    }

    fn candidates<K: Key>(&self, left: &[K], right: &[K]) -> JoinResult<Option<Candidates>> {
        let alignment = self.domain.align(left, right);
        if alignment.keep.count_ones() == 0 {
            log::debug!(
                "join of {} x {} rows has an empty key intersection",
                left.len(),
                right.len()
            );
            return Ok(None);
        }
        let rows: Vec<usize> = alignment.keep.ones().collect();

        // Codes are dense over the right domain, so code `c` is exactly group `c`.
        let by_right = self.domain.group_by(&alignment.dense_right);
        let bounds = by_right.segment_bounds();
        let starts: Vec<i64> = alignment
            .dense_left
            .iter()
            .map(|&code| bounds[code] as i64)
            .collect();
        let ends: Vec<i64> = alignment
            .dense_left
            .iter()
            .map(|&code| bounds[code + 1] as i64)
            .collect();

        let ranges = gen_ranges(&starts, &ends)?;

        let input_rows = left.len() + right.len();
        log::debug!(
            "{input_rows} input rows -> {} join rows ({:.1}x)",
            ranges.len(),
            ranges.len() as f64 / input_rows as f64
        );

        let positions: Vec<usize> = ranges.values.iter().map(|&pos| pos as usize).collect();
        Ok(Some(Candidates {
            rows,
            offsets: ranges.offsets,
            right: gather(&by_right.permutation, &positions),
        }))
    }
}

/// [`EquiJoin::inner_join`] on an [`InMemoryDomain`].
pub fn inner_join<K: Key>(left: &[K], right: &[K]) -> JoinResult<JoinIndices> {
    EquiJoin::new(&InMemoryDomain::default()).inner_join(left, right)
}

/// [`EquiJoin::inner_join_where`] on an [`InMemoryDomain`].
pub fn inner_join_where<K, L, R, F>(
    left: &[K],
    right: &[K],
    clause: Where<'_, L, R, F>,
) -> JoinResult<JoinIndices>
where
    K: Key,
    L: Clone + Send + Sync,
    R: Clone,
    F: Fn(&[L], &[R]) -> Result<Mask, PredicateError>,
{
    EquiJoin::new(&InMemoryDomain::default()).inner_join_where(left, right, clause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn always(l: &[i64], _r: &[i64]) -> Result<Mask, PredicateError> {
        Ok(l.iter().map(|_| true).collect())
    }

    #[test]
    fn unfiltered_join_multiplies_duplicates() {
        let out = inner_join(&[1i64, 2, 1, 3], &[1, 1, 3, 4]).unwrap();
        assert_eq!(out.left, vec![0, 0, 2, 2, 3]);
        assert_eq!(out.right, vec![0, 1, 0, 1, 2]);
    }

    #[test]
    fn empty_intersection_is_not_an_error() {
        let out = inner_join(&[1i64, 2, 3], &[4, 5, 6]).unwrap();
        assert!(out.is_empty());
        assert!(out.right.is_empty());
        assert!(inner_join::<i64>(&[], &[1]).unwrap().is_empty());
        assert!(inner_join::<i64>(&[1], &[]).unwrap().is_empty());
    }

    #[test]
    fn predicate_drops_rows_whose_candidates_are_all_rejected() {
        let left = [1i64, 1, 2];
        let right = [1i64, 1, 2];
        let left_aux = [10i64, 20, 30];
        let right_aux = [1i64, 2, 100];
        let clause = Where::new(&left_aux, &right_aux, |l: &[i64], r: &[i64]| {
            Ok(l.iter().zip(r).map(|(a, b)| a > b).collect())
        });

        let out = inner_join_where(&left, &right, clause).unwrap();
        assert_eq!(out.left, vec![0, 0, 1, 1]);
        assert_eq!(out.right, vec![0, 1, 0, 1]);
        assert!(!out.left.contains(&2));
    }

    #[test]
    fn predicate_rejecting_everything_yields_empty_output() {
        let clause = Where::new(&[1i64, 2], &[3i64, 4], |l: &[i64], _r: &[i64]| {
            Ok(l.iter().map(|_| false).collect())
        });
        let out = inner_join_where(&[5i64, 5], &[5, 5], clause).unwrap();
        assert_eq!(out, JoinIndices::default());
    }

    #[test]
    fn where_clause_columns_must_match_keys() {
        let clause = Where::new(&[1i64], &[1i64, 2], always);
        let err = inner_join_where(&[1i64, 2], &[1, 2], clause).unwrap_err();
        assert!(matches!(
            err,
            JoinError::ShapeMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));

        let clause = Where::new(&[1i64, 2], &[1i64], always);
        let err = inner_join_where(&[1i64, 2], &[1, 2], clause).unwrap_err();
        assert!(matches!(err, JoinError::ShapeMismatch { .. }));
    }

    #[test]
    fn smoke_test_catches_failing_predicate_before_joining() {
        let clause = Where::new(&[1i64, 0], &[1i64, 1], |l: &[i64], r: &[i64]| {
            let mut out = Mask::with_capacity_bits(l.len());
            for (a, b) in l.iter().zip(r) {
                let quotient = b.checked_div(*a).ok_or("division by zero")?;
                out.push(quotient > 0);
            }
            Ok(out)
        });
        let err = inner_join_where(&[1i64, 2], &[3, 4], clause).unwrap_err();
        assert!(matches!(err, JoinError::PredicateEvaluation { .. }));
        assert_eq!(
            std::error::Error::source(&err).map(|e| e.to_string()),
            Some("division by zero".to_string())
        );
    }

    #[test]
    fn smoke_test_reports_panicking_predicate() {
        let clause = Where::new(&[1i64, 0], &[1i64, 1], |l: &[i64], r: &[i64]| {
            Ok(l.iter().zip(r).map(|(a, b)| b / a > 0).collect())
        });
        let err = inner_join_where(&[1i64, 2], &[3, 4], clause).unwrap_err();
        assert!(matches!(err, JoinError::PredicateEvaluation { .. }));
        let source = std::error::Error::source(&err)
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(source.contains("divide by zero"), "{source}");
    }

    #[test]
    fn predicate_must_return_one_result_per_row() {
        let clause = Where::new(&[1i64, 2], &[1i64, 2], |_l: &[i64], _r: &[i64]| {
            Ok(Mask::from(vec![true]))
        });
        let err = inner_join_where(&[1i64, 2], &[1, 2], clause).unwrap_err();
        assert!(matches!(err, JoinError::PredicateEvaluation { .. }));
    }

    #[test]
    fn smoke_test_sample_respects_options() {
        use std::cell::RefCell;

        let seen = RefCell::new(Vec::new());
        let clause = Where::new(&[1i64; 8], &[2i64; 8], |l: &[i64], _r: &[i64]| {
            seen.borrow_mut().push(l.len());
            Ok(l.iter().map(|_| true).collect())
        });
        let domain = InMemoryDomain::new();
        let join = EquiJoin::with_options(&domain, JoinOptions { smoke_test_rows: 3 });
        let out = join
            .inner_join_where(&[7i64; 8], &[7i64; 8], clause)
            .unwrap();
        assert_eq!(out.len(), 64);
        assert_eq!(*seen.borrow(), vec![3, 64]);
    }
}
