//! Seek-order index generation.
//!
//! [`SeekIndex`] walks `[start, stop)` in unit-sized strides. When the range is
//! not a multiple of the unit, the offset of the trailing partial unit
//! (`stop - remainder`) is yielded first, ahead of the full units. Deciding
//! when that tail is actually written belongs to [`crate::plan::IoPlan`].
//!
//! Random order shuffles groups of at most [`RANDOM_GROUP_SIZE`] unit indices
//! and then the indices inside each group. Only one group is materialised at a
//! time, which bounds memory at roughly 8 MB; ranges above one group are
//! therefore not a uniform permutation.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::{IoError, Result};

/// Maximum number of unit indices shuffled together.
pub const RANDOM_GROUP_SIZE: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeekOrder {
    Sequential,
    Reverse,
    Random,
}

impl SeekOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeekOrder::Sequential => "sequential",
            SeekOrder::Reverse => "reverse",
            SeekOrder::Random => "random",
        }
    }
}

impl fmt::Display for SeekOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeekOrder {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            // "sequencial" is accepted for old config files
            "sequential" | "seq" | "sequencial" => Ok(SeekOrder::Sequential),
            "reverse" => Ok(SeekOrder::Reverse),
            "random" => Ok(SeekOrder::Random),
            other => Err(IoError::InvalidArgument(format!(
                "unknown seek type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug)]
enum Cursor {
    Sequential { next: u64 },
    Reverse { next: u64 },
    Random(RandomCursor),
}

#[derive(Debug)]
struct RandomCursor {
    rng: StdRng,
    group_size: u64,
    /// Remaining group numbers, shuffled on first use.
    groups: Option<Vec<u64>>,
    current: Vec<u64>,
}

impl RandomCursor {
    fn next_index(&mut self, units: u64) -> Option<u64> {
        loop {
            if let Some(idx) = self.current.pop() {
                return Some(idx);
            }

            let group_size = self.group_size;
            let rng = &mut self.rng;
            let groups = self.groups.get_or_insert_with(|| {
                let mut groups: Vec<u64> = (0..units.div_ceil(group_size)).collect();
                groups.shuffle(rng);
                groups
            });
            let group = groups.pop()?;

            let lo = group * group_size;
            let hi = (lo + group_size).min(units);
            self.current = (lo..hi).collect();
            self.current.shuffle(&mut self.rng);
        }
    }
}

/// Lazy, single-pass sequence of byte offsets over `[start, stop)`.
///
/// Call [`SeekIndex::new`] again for another pass.
#[derive(Debug)]
pub struct SeekIndex {
    start: u64,
    stop: u64,
    unit: u64,
    units: u64,
    remainder: u64,
    tail_pending: bool,
    left: u64,
    cursor: Cursor,
}

impl SeekIndex {
    pub fn new(start: u64, stop: u64, unit: u64, order: SeekOrder) -> Result<Self> {
        if unit == 0 {
            return Err(IoError::InvalidArgument(
                "I/O unit size must be greater than zero".to_string(),
            ));
        }
        if stop < start {
            return Err(IoError::InvalidArgument(format!(
                "stop offset {} is before start offset {}",
                stop, start
            )));
        }

        let range = stop - start;
        let units = range / unit;
        let remainder = range % unit;
        let cursor = match order {
            SeekOrder::Sequential => Cursor::Sequential { next: 0 },
            SeekOrder::Reverse => Cursor::Reverse { next: units },
            SeekOrder::Random => Cursor::Random(RandomCursor {
                rng: StdRng::from_entropy(),
                group_size: RANDOM_GROUP_SIZE,
                groups: None,
                current: Vec::new(),
            }),
        };

        Ok(Self {
            start,
            stop,
            unit,
            units,
            remainder,
            tail_pending: remainder > 0,
            left: units + u64::from(remainder > 0),
            cursor,
        })
    }

    /// Override the random group size. No effect for other orders.
    pub fn with_group_size(mut self, group_size: u64) -> Self {
        if let Cursor::Random(ref mut random) = self.cursor {
            random.group_size = group_size.max(1);
        }
        self
    }

    /// Seed the random order. No effect for other orders.
    pub fn with_seed(mut self, seed: u64) -> Self {
        if let Cursor::Random(ref mut random) = self.cursor {
            random.rng = StdRng::seed_from_u64(seed);
        }
        self
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn stop(&self) -> u64 {
        self.stop
    }

    pub fn unit(&self) -> u64 {
        self.unit
    }

    /// Number of full units in the range.
    pub fn units(&self) -> u64 {
        self.units
    }

    /// Length of the trailing partial unit (0 if none).
    pub fn remainder(&self) -> u64 {
        self.remainder
    }

    pub fn order(&self) -> SeekOrder {
        match self.cursor {
            Cursor::Sequential { .. } => SeekOrder::Sequential,
            Cursor::Reverse { .. } => SeekOrder::Reverse,
            Cursor::Random(_) => SeekOrder::Random,
        }
    }
}

impl Iterator for SeekIndex {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.tail_pending {
            self.tail_pending = false;
            self.left -= 1;
            return Some(self.stop - self.remainder);
        }

        let idx = match &mut self.cursor {
            Cursor::Sequential { next } => {
                if *next >= self.units {
                    return None;
                }
                *next += 1;
                *next - 1
            }
            Cursor::Reverse { next } => {
                if *next == 0 {
                    return None;
                }
                *next -= 1;
                *next
            }
            Cursor::Random(random) => random.next_index(self.units)?,
        };
        self.left -= 1;
        Some(self.start + idx * self.unit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.left) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_parse() {
        assert_eq!("seq".parse::<SeekOrder>().unwrap(), SeekOrder::Sequential);
        assert_eq!(
            "sequencial".parse::<SeekOrder>().unwrap(),
            SeekOrder::Sequential
        );
        assert_eq!("REVERSE".parse::<SeekOrder>().unwrap(), SeekOrder::Reverse);
        assert!("sideways".parse::<SeekOrder>().is_err());
    }

    #[test]
    fn test_sequential_with_tail_first() {
        let offsets: Vec<u64> = SeekIndex::new(0, 10240, 4096, SeekOrder::Sequential)
            .unwrap()
            .collect();
        assert_eq!(offsets, vec![8192, 0, 4096]);
    }

    #[test]
    fn test_reverse() {
        let offsets: Vec<u64> = SeekIndex::new(100, 400, 100, SeekOrder::Reverse)
            .unwrap()
            .collect();
        assert_eq!(offsets, vec![300, 200, 100]);
    }

    #[test]
    fn test_random_covers_range_once() {
        let mut offsets: Vec<u64> = SeekIndex::new(0, 1000 * 10, 10, SeekOrder::Random)
            .unwrap()
            .with_seed(42)
            .with_group_size(64)
            .collect();
        offsets.sort_unstable();
        let expected: Vec<u64> = (0..1000).map(|i| i * 10).collect();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn test_random_is_offset_by_start() {
        let offsets: Vec<u64> = SeekIndex::new(4096, 4096 + 8 * 512, 512, SeekOrder::Random)
            .unwrap()
            .collect();
        assert_eq!(offsets.len(), 8);
        assert!(offsets.iter().all(|o| *o >= 4096 && (o - 4096) % 512 == 0));
    }

    #[test]
    fn test_size_hint_is_exact() {
        let mut index = SeekIndex::new(0, 10, 3, SeekOrder::Reverse).unwrap();
        assert_eq!(index.size_hint(), (4, Some(4)));
        index.next();
        assert_eq!(index.size_hint(), (3, Some(3)));
        assert_eq!(index.count(), 3);
    }

    #[test]
    fn test_empty_and_invalid_ranges() {
        assert_eq!(SeekIndex::new(5, 5, 4, SeekOrder::Random).unwrap().count(), 0);
        assert!(SeekIndex::new(0, 10, 0, SeekOrder::Sequential).is_err());
        assert!(SeekIndex::new(10, 0, 4, SeekOrder::Sequential).is_err());
    }

    #[test]
    fn test_range_smaller_than_unit_is_tail_only() {
        let offsets: Vec<u64> = SeekIndex::new(0, 100, 4096, SeekOrder::Sequential)
            .unwrap()
            .collect();
        assert_eq!(offsets, vec![0]);
    }
}
