//! Randomized check that statistics-based skipping never drops a match.
//!
//! For random chunks and random filters, whenever `check_statistics` says a
//! chunk can be skipped, no value in the chunk may satisfy the filter. Chunk
//! values are drawn so that the bounds themselves are always present, which is
//! where an off-by-one in a bound comparison would show.

use std::ops::Bound;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vspace_filter::{CompareOp, Filter, ScalarValue, StatisticsFilter};

const OPS: [CompareOp; 6] = [
    CompareOp::Eq,
    CompareOp::NotEq,
    CompareOp::Lt,
    CompareOp::LtEq,
    CompareOp::Gt,
    CompareOp::GtEq,
];

fn random_bound(rng: &mut StdRng) -> Bound<ScalarValue> {
    let v = ScalarValue::Int64(rng.random_range(-20..=20));
    match rng.random_range(0..3) {
        0 => Bound::Included(v),
        1 => Bound::Excluded(v),
        _ => Bound::Unbounded,
    }
}

fn random_filter(rng: &mut StdRng, depth: u32) -> Filter {
    match rng.random_range(0..if depth == 0 { 4 } else { 3 }) {
        0 => {
            let op = OPS[rng.random_range(0..OPS.len())];
            Filter::compare("c", op, rng.random_range(-20i64..=20))
        }
        1 => Filter::range("c", random_bound(rng), random_bound(rng)),
        2 => {
            let n = rng.random_range(0..4);
            Filter::is_in("c", (0..n).map(|_| rng.random_range(-20i64..=20)))
        }
        _ => {
            let n = rng.random_range(1..4);
            let children = (0..n).map(|_| random_filter(rng, depth + 1)).collect();
            Filter::and(children).expect("same column")
        }
    }
}

#[test]
fn skipped_chunks_never_contain_matches() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..5_000 {
        let a = rng.random_range(-20i64..=20);
        let b = rng.random_range(-20i64..=20);
        let (min, max) = (a.min(b), a.max(b));

        let mut values = vec![min, max];
        for _ in 0..rng.random_range(0..6) {
            values.push(rng.random_range(min..=max));
        }

        let filter = random_filter(&mut rng, 0);
        let skip = filter.check_statistics(
            Some(&ScalarValue::Int64(min)),
            Some(&ScalarValue::Int64(max)),
        );
        if skip {
            for v in &values {
                assert!(
                    !filter.evaluate(&ScalarValue::Int64(*v)),
                    "filter {filter:?} skipped chunk [{min}, {max}] containing match {v}"
                );
            }
        }
    }
}

#[test]
fn full_domain_chunks_are_exact_for_simple_comparisons() {
    // When a chunk holds every integer in [min, max], a comparison that keeps
    // the chunk must actually match one of them.
    for op in OPS {
        for v in -5i64..=5 {
            let filter = Filter::compare("c", op, v);
            for min in -3i64..=3 {
                for max in min..=3 {
                    let skip = filter.check_statistics(
                        Some(&ScalarValue::Int64(min)),
                        Some(&ScalarValue::Int64(max)),
                    );
                    let any_match = (min..=max).any(|x| filter.evaluate(&ScalarValue::Int64(x)));
                    assert_eq!(skip, !any_match, "{op:?} {v} over [{min}, {max}]");
                }
            }
        }
    }
}
