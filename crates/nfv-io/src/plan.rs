//! Ordered I/O operations over a region.
//!
//! The trailing partial unit is pre-fetched from the [`SeekIndex`] before the
//! main pass. Reverse order applies it first; sequential and random orders
//! apply it after every full unit has been handled.

use crate::seek::{SeekIndex, SeekOrder};
use crate::Result;

/// One write or read: `len` bytes at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoOp {
    pub offset: u64,
    pub len: u64,
}

impl IoOp {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

#[derive(Debug)]
pub struct IoPlan {
    index: SeekIndex,
    unit: u64,
    tail: Option<IoOp>,
    tail_first: bool,
}

impl IoPlan {
    pub fn new(start: u64, stop: u64, unit: u64, order: SeekOrder) -> Result<Self> {
        Ok(Self::from_index(SeekIndex::new(start, stop, unit, order)?))
    }

    pub fn from_index(mut index: SeekIndex) -> Self {
        let remainder = index.remainder();
        let tail = if remainder > 0 {
            index.next().map(|offset| IoOp {
                offset,
                len: remainder,
            })
        } else {
            None
        };
        Self {
            unit: index.unit(),
            tail_first: index.order() == SeekOrder::Reverse,
            tail,
            index,
        }
    }

    /// The partial trailing op, if it has not been emitted yet.
    pub fn tail(&self) -> Option<IoOp> {
        self.tail
    }

    /// Total bytes the remaining ops cover.
    pub fn remaining_bytes(&self) -> u64 {
        let (full, _) = self.index.size_hint();
        full as u64 * self.unit + self.tail.map_or(0, |t| t.len)
    }
}

impl Iterator for IoPlan {
    type Item = IoOp;

    fn next(&mut self) -> Option<IoOp> {
        if self.tail_first {
            if let Some(tail) = self.tail.take() {
                return Some(tail);
            }
        }
        match self.index.next() {
            Some(offset) => Some(IoOp {
                offset,
                len: self.unit,
            }),
            None => self.tail.take(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let extra = usize::from(self.tail.is_some());
        match self.index.size_hint() {
            (lo, Some(hi)) => (lo.saturating_add(extra), hi.checked_add(extra)),
            (lo, None) => (lo.saturating_add(extra), None),
        }
    }
}
