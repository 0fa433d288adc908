#![no_main]

use libfuzzer_sys::fuzz_target;

use formula_join::{compute_join_size, inner_join, inner_join_where, Mask, PredicateError, Where};

/// Keep inputs small: an all-duplicates input of `n` rows per side yields `n * n` pairs.
const MAX_ROWS_PER_SIDE: usize = 256;

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };

    let split = (split as usize).min(rest.len());
    let (left_bytes, right_bytes) = rest.split_at(split);
    // Fold keys into a small alphabet so matches are common.
    let left: Vec<i64> = left_bytes
        .iter()
        .take(MAX_ROWS_PER_SIDE)
        .map(|b| i64::from(b % 16) - 8)
        .collect();
    let right: Vec<i64> = right_bytes
        .iter()
        .take(MAX_ROWS_PER_SIDE)
        .map(|b| i64::from(b % 16) - 8)
        .collect();

    let out = inner_join(&left, &right).expect("unfiltered join cannot fail");
    assert_eq!(out.left.len(), out.right.len());
    for (l, r) in out.pairs() {
        assert_eq!(left[l], right[r]);
    }
    assert_eq!(compute_join_size(&left, &right).elements, out.len() as u64);

    // Use the raw bytes as auxiliary columns and keep pairs whose bytes share parity.
    let left_aux: Vec<u8> = left_bytes.iter().take(MAX_ROWS_PER_SIDE).copied().collect();
    let right_aux: Vec<u8> = right_bytes.iter().take(MAX_ROWS_PER_SIDE).copied().collect();
    let same_parity = |l: &[u8], r: &[u8]| -> Result<Mask, PredicateError> {
        Ok(l.iter().zip(r).map(|(a, b)| a % 2 == b % 2).collect())
    };
    let filtered = inner_join_where(&left, &right, Where::new(&left_aux, &right_aux, same_parity))
        .expect("parity predicate cannot fail");
    assert!(filtered.len() <= out.len());
    for (l, r) in filtered.pairs() {
        assert_eq!(left[l], right[r]);
        assert_eq!(left_aux[l] % 2, right_aux[r] % 2);
    }

    std::hint::black_box(filtered);
});
