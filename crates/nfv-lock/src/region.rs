//! Byte-range layout over a file.
//!
//! [`locate`] places regions of `length` bytes every `length + step` bytes
//! from `start`, bounded by `stop` (or the end of the file). A strategy string
//! `start:length:step:stop:duration` describes one such layout plus how long
//! the locks are held; several strategies are joined with `+`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use nfv_config::parse_size;

use crate::{LockError, Result};

/// One locked byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockRegion {
    pub offset: u64,
    pub length: u64,
}

impl LockRegion {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    pub fn overlaps(&self, other: &LockRegion) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

impl fmt::Display for LockRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// Lazy sequence of regions produced by [`locate`]
#[derive(Debug, Clone)]
pub struct Locator {
    start: u64,
    length: u64,
    stride: u64,
    limit: u64,
    next: u64,
    count: u64,
}

impl Locator {
    fn empty() -> Self {
        Self {
            start: 0,
            length: 0,
            stride: 1,
            limit: 0,
            next: 0,
            count: 0,
        }
    }
}

impl Iterator for Locator {
    type Item = LockRegion;

    fn next(&mut self) -> Option<LockRegion> {
        if self.next >= self.count {
            return None;
        }
        let offset = self
            .next
            .checked_mul(self.stride)
            .and_then(|delta| self.start.checked_add(delta));
        self.next += 1;
        match offset {
            Some(offset) if offset.saturating_add(self.length) <= self.limit => {
                Some(LockRegion::new(offset, self.length))
            }
            // Offsets only grow, nothing after this fits either
            _ => {
                self.next = self.count;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let upper = usize::try_from(self.count - self.next).ok();
        (0, upper)
    }
}

/// Lay out lock regions over a file of `file_size` bytes.
///
/// - `step` larger than what is left after `start` is clamped to it.
/// - `length == 0`, or a length running past the end, becomes one region
///   from `start` to the end of the file and `stop` is ignored.
/// - `stop` in `1..=file_size` bounds the layout, otherwise the end of the
///   file does.
///
/// A `start` at or past the end yields nothing.
pub fn locate(file_size: u64, start: u64, length: u64, step: u64, stop: u64) -> Locator {
    if start >= file_size {
        return Locator::empty();
    }
    let available = file_size - start;

    let step = step.min(available);
    let (length, stop) = if length == 0 || length > available {
        (available, file_size)
    } else {
        (length, stop)
    };
    let limit = if stop > 0 && stop <= file_size {
        stop
    } else {
        file_size
    };

    let stride = length.saturating_add(step);
    let count = limit.saturating_sub(start) / stride;

    Locator {
        start,
        length,
        stride,
        limit,
        next: 0,
        count: count.saturating_add(1),
    }
}

/// One `start:length:step:stop:duration` layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockStrategy {
    pub start: u64,
    pub length: u64,
    pub step: u64,
    pub stop: u64,
    /// How long the locks are held once on
    pub duration: Duration,
}

impl Default for LockStrategy {
    fn default() -> Self {
        Self {
            start: 0,
            length: 1,
            step: 1,
            stop: 0,
            duration: Duration::ZERO,
        }
    }
}

impl LockStrategy {
    pub fn locate(&self, file_size: u64) -> Locator {
        locate(file_size, self.start, self.length, self.step, self.stop)
    }

    /// Same layout with the step replaced.
    pub fn with_step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }
}

impl FromStr for LockStrategy {
    type Err = LockError;

    /// Missing trailing fields keep their defaults (`0:1:1:0:0`).
    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.trim().split(':').collect();
        if fields.len() > 5 {
            return Err(LockError::InvalidArgument(format!(
                "lock strategy has {} fields, expected at most 5: {}",
                fields.len(),
                s
            )));
        }

        let mut strategy = LockStrategy::default();
        for (i, field) in fields.iter().enumerate() {
            match i {
                0 => strategy.start = parse_size(field)?,
                1 => strategy.length = parse_size(field)?,
                2 => strategy.step = parse_size(field)?,
                3 => strategy.stop = parse_size(field)?,
                _ => {
                    let secs = field.trim().parse::<u64>().map_err(|_| {
                        LockError::InvalidArgument(format!("invalid lock duration: {}", field))
                    })?;
                    strategy.duration = Duration::from_secs(secs);
                }
            }
        }
        Ok(strategy)
    }
}

impl fmt::Display for LockStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.start,
            self.length,
            self.step,
            self.stop,
            self.duration.as_secs()
        )
    }
}

/// Several strategies joined with `+`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPlan {
    strategies: Vec<LockStrategy>,
}

impl LockPlan {
    pub fn new(strategies: Vec<LockStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[LockStrategy] {
        &self.strategies
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LockStrategy> {
        self.strategies.iter()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for LockPlan {
    fn default() -> Self {
        Self::new(vec![LockStrategy::default()])
    }
}

impl FromStr for LockPlan {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self> {
        let strategies = s
            .split('+')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<LockStrategy>>>()?;
        if strategies.is_empty() {
            return Ok(LockPlan::default());
        }
        Ok(LockPlan::new(strategies))
    }
}

impl<'a> IntoIterator for &'a LockPlan {
    type Item = &'a LockStrategy;
    type IntoIter = std::slice::Iter<'a, LockStrategy>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
