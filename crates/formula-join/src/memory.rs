//! In-process implementation of [`GroupedDomain`].

use crate::bitmap::Mask;
use crate::domain::{Alignment, GroupedDomain, Grouping, Key};
use crate::error::{JoinError, JoinResult};
use ahash::AHashMap;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use std::sync::OnceLock;

/// Inputs shorter than this are always sorted on the calling thread.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 1 << 16;

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
static SORT_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn sort_thread_pool() -> Option<&'static ThreadPool> {
    SORT_THREAD_POOL.get_or_init(build_sort_thread_pool).as_ref()
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn build_sort_thread_pool() -> Option<ThreadPool> {
    // Stay off the global pool: its initialization panics if the OS refuses to spawn threads.
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let requested = std::env::var("RAYON_NUM_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0);

    let mut threads = match requested {
        Some(n) => n.min(available).max(1),
        None => available.min(8).max(1),
    };

    loop {
        match ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => return Some(pool),
            Err(_) if threads > 1 => {
                threads /= 2;
            }
            Err(err) => {
                log::warn!("falling back to sequential grouping sorts: {err}");
                return None;
            }
        }
    }
}

/// Grouping, broadcast and alignment over plain slices held in memory.
#[derive(Clone, Copy, Debug)]
pub struct InMemoryDomain {
    parallel_threshold: usize,
}

impl Default for InMemoryDomain {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl InMemoryDomain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A domain that never leaves the calling thread.
    pub fn sequential() -> Self {
        Self {
            parallel_threshold: usize::MAX,
        }
    }

    pub fn with_parallel_threshold(parallel_threshold: usize) -> Self {
        Self { parallel_threshold }
    }

    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    fn sorted_permutation<K: Key>(&self, keys: &[K]) -> Vec<usize> {
        let mut permutation: Vec<usize> = (0..keys.len()).collect();

        #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
        {
            if keys.len() >= self.parallel_threshold() {
                if let Some(pool) = sort_thread_pool() {
                    pool.install(|| permutation.par_sort_by_key(|&idx| keys[idx]));
                    return permutation;
                }
            }
        }

        permutation.sort_by_key(|&idx| keys[idx]);
        permutation
    }
}

impl GroupedDomain for InMemoryDomain {
    fn group_by<K: Key>(&self, keys: &[K]) -> Grouping<K> {
        let permutation = self.sorted_permutation(keys);

        let mut unique_keys = Vec::new();
        let mut segments = Vec::new();
        let mut previous: Option<K> = None;
        for (pos, &idx) in permutation.iter().enumerate() {
            let key = keys[idx];
            if previous != Some(key) {
                unique_keys.push(key);
                segments.push(pos);
                previous = Some(key);
            }
        }

        Grouping {
            unique_keys,
            segments,
            permutation,
        }
    }

    fn broadcast<T: Clone + Send + Sync>(
        &self,
        segments: &[usize],
        values: &[T],
        size: usize,
        permutation: Option<&[usize]>,
    ) -> JoinResult<Vec<T>> {
        if values.len() != segments.len() {
            return Err(JoinError::shape(
                "broadcast values",
                segments.len(),
                values.len(),
            ));
        }
        if let Some(permutation) = permutation {
            if permutation.len() != size {
                return Err(JoinError::shape(
                    "broadcast permutation",
                    size,
                    permutation.len(),
                ));
            }
        }
        match segments.first() {
            None if size > 0 => {
                return Err(JoinError::Domain(format!(
                    "cannot broadcast zero groups across {size} positions"
                )))
            }
            Some(&first) if first != 0 => {
                return Err(JoinError::Domain(format!(
                    "first segment must start at 0, got {first}"
                )))
            }
            _ => {}
        }

        let mut expanded = Vec::with_capacity(size);
        for (group, (&start, value)) in segments.iter().zip(values).enumerate() {
            let end = segments.get(group + 1).copied().unwrap_or(size);
            if end < start || end > size {
                return Err(JoinError::Domain(format!(
                    "segment {group} spans {start}..{end}, outside 0..{size}"
                )));
            }
            expanded.extend(std::iter::repeat(value).take(end - start).cloned());
        }

        let Some(permutation) = permutation else {
            return Ok(expanded);
        };

        // Scatter through the permutation by gathering through its inverse.
        let mut inverse = vec![usize::MAX; size];
        for (pos, &target) in permutation.iter().enumerate() {
            if target >= size || inverse[target] != usize::MAX {
                return Err(JoinError::Domain(format!(
                    "broadcast permutation is not a bijection on 0..{size}"
                )));
            }
            inverse[target] = pos;
        }
        Ok(inverse.iter().map(|&pos| expanded[pos].clone()).collect())
    }

    fn align<K: Key>(&self, left: &[K], right: &[K]) -> Alignment {
        let mut distinct = right.to_vec();
        distinct.sort_unstable();
        distinct.dedup();

        let codes: AHashMap<K, usize> = distinct
            .iter()
            .enumerate()
            .map(|(code, &key)| (key, code))
            .collect();

        let dense_right = right.iter().map(|key| codes[key]).collect();

        let mut keep = Mask::with_capacity_bits(left.len());
        let mut dense_left = Vec::new();
        for key in left {
            match codes.get(key) {
                Some(&code) => {
                    keep.push(true);
                    dense_left.push(code);
                }
                None => keep.push(false),
            }
        }

        Alignment {
            keep,
            dense_left,
            dense_right,
            domain_size: distinct.len(),
        }
    }
}
