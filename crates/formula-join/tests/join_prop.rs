#![cfg(not(target_arch = "wasm32"))]

use formula_join::{
    compute_join_size, gen_ranges, inner_join, inner_join_where, EquiJoin, InMemoryDomain, Mask,
    PredicateError, Where,
};
use proptest::prelude::*;
use std::collections::HashMap;

fn keys() -> impl Strategy<Value = Vec<i64>> {
    // A narrow key range keeps duplicates (and therefore fan-out) common.
    prop::collection::vec(-8i64..8, 0..40)
}

fn brute_force_pairs(left: &[i64], right: &[i64]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for (i, l) in left.iter().enumerate() {
        for (j, r) in right.iter().enumerate() {
            if l == r {
                out.push((i, j));
            }
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn unfiltered_join_matches_nested_loop(left in keys(), right in keys()) {
        let out = inner_join(&left, &right).unwrap();
        prop_assert_eq!(out.left.len(), out.right.len());

        let mut pairs: Vec<_> = out.pairs().collect();
        pairs.sort_unstable();
        prop_assert_eq!(pairs, brute_force_pairs(&left, &right));
        prop_assert_eq!(compute_join_size(&left, &right).elements, out.len() as u64);
    }

    #[test]
    fn filtered_join_matches_filtered_nested_loop(
        (left, left_aux) in keys().prop_flat_map(|k| {
            let n = k.len();
            (Just(k), prop::collection::vec(0i64..100, n))
        }),
        (right, right_aux) in keys().prop_flat_map(|k| {
            let n = k.len();
            (Just(k), prop::collection::vec(0i64..100, n))
        }),
    ) {
        let within = |l: &[i64], r: &[i64]| -> Result<Mask, PredicateError> {
            Ok(l.iter().zip(r).map(|(a, b)| (a - b).abs() <= 25).collect())
        };
        let out = inner_join_where(&left, &right, Where::new(&left_aux, &right_aux, within)).unwrap();

        let mut rows_per_left: HashMap<usize, usize> = HashMap::new();
        for (l, r) in out.pairs() {
            prop_assert_eq!(left[l], right[r]);
            prop_assert!((left_aux[l] - right_aux[r]).abs() <= 25);
            *rows_per_left.entry(l).or_insert(0) += 1;
        }
        // A left row is either absent or carries at least one accepted pair.
        prop_assert!(rows_per_left.values().all(|&n| n > 0));

        let mut pairs: Vec<_> = out.pairs().collect();
        pairs.sort_unstable();
        let expected: Vec<_> = brute_force_pairs(&left, &right)
            .into_iter()
            .filter(|&(i, j)| (left_aux[i] - right_aux[j]).abs() <= 25)
            .collect();
        prop_assert_eq!(pairs, expected);
    }

    #[test]
    fn parallel_grouping_agrees_with_sequential(left in keys(), right in keys()) {
        let sequential = InMemoryDomain::sequential();
        let parallel = InMemoryDomain::with_parallel_threshold(1);
        prop_assert_eq!(
            EquiJoin::new(&sequential).inner_join(&left, &right).unwrap(),
            EquiJoin::new(&parallel).inner_join(&left, &right).unwrap()
        );
    }

    #[test]
    fn gen_ranges_concatenates_each_range(
        pairs in prop::collection::vec((-50i64..50, 1i64..10), 0..20)
    ) {
        let starts: Vec<i64> = pairs.iter().map(|&(s, _)| s).collect();
        let ends: Vec<i64> = pairs.iter().map(|&(s, len)| s + len).collect();
        let ranges = gen_ranges(&starts, &ends).unwrap();

        let expected: Vec<i64> = starts.iter().zip(&ends).flat_map(|(&s, &e)| s..e).collect();
        prop_assert_eq!(&ranges.values, &expected);
        for (idx, (&s, &e)) in starts.iter().zip(&ends).enumerate() {
            let want: Vec<i64> = (s..e).collect();
            prop_assert_eq!(ranges.range(idx), want.as_slice());
        }
    }
}
