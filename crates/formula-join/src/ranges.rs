//! Flattening of `[start, end)` range pairs into one segmented index array.

use crate::error::{JoinError, JoinResult};
use crate::kernels::exclusive_cumsum;

/// A concatenation of contiguous ranges.
///
/// Range `i` occupies `values[offsets[i]..offsets[i + 1]]` (the last one runs to the end).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ranges {
    pub offsets: Vec<usize>,
    pub values: Vec<i64>,
}

impl Ranges {
    /// Total number of flattened values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn range_count(&self) -> usize {
        self.offsets.len()
    }

    /// Values belonging to range `idx`.
    pub fn range(&self, idx: usize) -> &[i64] {
        let start = self.offsets[idx];
        let end = self
            .offsets
            .get(idx + 1)
            .copied()
            .unwrap_or(self.values.len());
        &self.values[start..end]
    }
}

/// Generate the flattened ranges `[starts[i], ends[i])` for every pair, in order.
///
/// Every pair must be non-empty (`ends[i] > starts[i]`). The output is built with a single
/// scatter and prefix sum: a delta array of ones is overwritten at each range start with the jump
/// needed to land on `starts[i]`, and its running sum reproduces every index.
pub fn gen_ranges(starts: &[i64], ends: &[i64]) -> JoinResult<Ranges> {
    if starts.len() != ends.len() {
        return Err(JoinError::shape("range ends", starts.len(), ends.len()));
    }
    if starts.is_empty() {
        return Ok(Ranges::default());
    }

    let mut lengths = Vec::with_capacity(starts.len());
    for (idx, (&start, &end)) in starts.iter().zip(ends).enumerate() {
        if end <= start {
            return Err(JoinError::Domain(format!(
                "all ends must be greater than starts (pair {idx}: start {start}, end {end})"
            )));
        }
        let len = end.checked_sub(start).and_then(|len| usize::try_from(len).ok());
        let Some(len) = len else {
            return Err(JoinError::Domain(format!(
                "range {start}..{end} at pair {idx} is too long to materialize"
            )));
        };
        lengths.push(len);
    }

    let (offsets, total) = exclusive_cumsum(&lengths);

    let mut deltas = vec![1i64; total];
    deltas[0] = starts[0];
    for idx in 1..starts.len() {
        // Jump from the last value of range `idx - 1` to the first value of range `idx`. The jump
        // may not fit in an i64, but the wrapping running sum still lands on `starts[idx]`.
        let previous_last = ends[idx - 1] - 1;
        deltas[offsets[idx]] = starts[idx].wrapping_sub(previous_last);
    }

    let mut running = 0i64;
    let values = deltas
        .into_iter()
        .map(|delta| {
            running = running.wrapping_add(delta);
            running
        })
        .collect();

    log::trace!("generated {total} range values from {} pairs", starts.len());

    Ok(Ranges { offsets, values })
}
