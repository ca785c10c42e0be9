//! Properties of the seek index and I/O plan over many ranges.

use std::collections::BTreeSet;

use nfv_io::{IoPlan, SeekIndex, SeekOrder};

const RANGES: &[(u64, u64, u64)] = &[
    (0, 10240, 4096),
    (0, 8192, 4096),
    (100, 1100, 100),
    (7, 7 + 33 * 17 + 5, 17),
    (4096, 4096 + 1, 512),
    (0, 65536, 1),
    (3, 3 + 1000 * 999, 999),
];

fn full_units(index: SeekIndex) -> BTreeSet<u64> {
    let remainder = index.remainder();
    let mut offsets = index;
    if remainder > 0 {
        offsets.next();
    }
    offsets.collect()
}

#[test]
fn test_sequential_and_reverse_cover_same_units() {
    for &(start, stop, unit) in RANGES {
        let seq = full_units(SeekIndex::new(start, stop, unit, SeekOrder::Sequential).unwrap());
        let rev = full_units(SeekIndex::new(start, stop, unit, SeekOrder::Reverse).unwrap());
        let rnd = full_units(SeekIndex::new(start, stop, unit, SeekOrder::Random).unwrap());
        assert_eq!(seq, rev, "{}..{} / {}", start, stop, unit);
        assert_eq!(seq, rnd, "{}..{} / {}", start, stop, unit);

        let expected: BTreeSet<u64> = (0..(stop - start) / unit).map(|i| start + i * unit).collect();
        assert_eq!(seq, expected);
    }
}

#[test]
fn test_remainder_offset_emitted_first() {
    for order in [SeekOrder::Sequential, SeekOrder::Reverse, SeekOrder::Random] {
        let mut index = SeekIndex::new(0, 10240, 4096, order).unwrap();
        assert_eq!(index.remainder(), 2048);
        assert_eq!(index.next(), Some(8192));
    }
}

#[test]
fn test_plan_bytes_sum_to_range() {
    for &(start, stop, unit) in RANGES {
        for order in [SeekOrder::Sequential, SeekOrder::Reverse, SeekOrder::Random] {
            let ops: Vec<_> = IoPlan::new(start, stop, unit, order).unwrap().collect();
            let total: u64 = ops.iter().map(|op| op.len).sum();
            assert_eq!(total, stop - start);

            // Ops never overlap and stay inside the range
            let mut sorted = ops.clone();
            sorted.sort_by_key(|op| op.offset);
            let mut cursor = start;
            for op in sorted {
                assert_eq!(op.offset, cursor);
                cursor = op.end();
            }
            assert_eq!(cursor, stop);
        }
    }
}

#[test]
fn test_grouped_random_is_a_permutation() {
    let index = SeekIndex::new(0, 10_000, 1, SeekOrder::Random)
        .unwrap()
        .with_group_size(128)
        .with_seed(9);
    let offsets: Vec<u64> = index.collect();
    assert_eq!(offsets.len(), 10_000);

    let unique: BTreeSet<u64> = offsets.iter().copied().collect();
    assert_eq!(unique.len(), 10_000);
    assert_ne!(offsets, (0..10_000).collect::<Vec<_>>());
}
