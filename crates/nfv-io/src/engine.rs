//! Write, read and verify passes over a region of a sink.

use tracing::instrument;

use crate::integrity::IntegrityStore;
use crate::sink::IoSink;
use crate::tactic::IoTactic;
use crate::{IoError, Result};

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoReport {
    pub ops: u64,
    pub bytes: u64,
    pub verified_units: u64,
}

impl IoReport {
    pub fn merge(&mut self, other: IoReport) {
        self.ops += other.ops;
        self.bytes += other.bytes;
        self.verified_units += other.verified_units;
    }
}

fn to_usize(len: u64) -> Result<usize> {
    usize::try_from(len).map_err(|_| IoError::InvalidArgument(format!("I/O of {} bytes is too large", len)))
}

/// Write `[start, stop)` following the tactic's plan.
///
/// With data check enabled the full unit buffer of every op is recorded,
/// including ops that only write a prefix of it.
#[instrument(skip(sink, tactic, store), level = "debug")]
pub fn write_region<S: IoSink + ?Sized>(
    sink: &mut S,
    tactic: &mut IoTactic,
    store: &mut IntegrityStore,
    start: u64,
    stop: u64,
) -> Result<IoReport> {
    let check = tactic.data_check();
    let mut report = IoReport::default();

    for op in tactic.plan(start, stop)? {
        let len = to_usize(op.len)?;
        let data = tactic.get_data_pattern()?;
        if data.len() < len {
            return Err(IoError::InvalidArgument(format!(
                "data pattern of {} bytes is shorter than the {} byte write at {}",
                data.len(),
                len,
                op.offset
            )));
        }
        if check {
            store.record(data);
        }
        sink.write_at(op.offset, &data[..len])?;
        report.ops += 1;
        report.bytes += op.len;
    }
    sink.flush_sink()?;

    tracing::debug!(ops = report.ops, bytes = report.bytes, "write pass done");
    Ok(report)
}

/// Read `[start, stop)` following the tactic's plan, discarding the data.
#[instrument(skip(sink, tactic), level = "debug")]
pub fn read_region<S: IoSink + ?Sized>(
    sink: &mut S,
    tactic: &IoTactic,
    start: u64,
    stop: u64,
) -> Result<IoReport> {
    let mut buf = vec![0u8; to_usize(tactic.unit_size())?];
    let mut report = IoReport::default();

    for op in tactic.plan(start, stop)? {
        let len = to_usize(op.len)?;
        let n = sink.read_at(op.offset, &mut buf[..len])?;
        report.ops += 1;
        report.bytes += n as u64;
    }
    Ok(report)
}

/// Read every full unit of `[start, stop)` in order and check each against
/// `store`. The trailing partial unit is not checked.
///
/// The store is cleared when the pass ends, whether it succeeded or not.
#[instrument(skip(sink, tactic, store), level = "debug")]
pub fn verify_region<S: IoSink + ?Sized>(
    sink: &mut S,
    tactic: &IoTactic,
    store: &mut IntegrityStore,
    start: u64,
    stop: u64,
) -> Result<IoReport> {
    let result = verify_units(sink, tactic.unit_size(), store, start, stop);
    store.clear();
    result
}

fn verify_units<S: IoSink + ?Sized>(
    sink: &mut S,
    unit: u64,
    store: &IntegrityStore,
    start: u64,
    stop: u64,
) -> Result<IoReport> {
    if unit == 0 || stop < start {
        return Err(IoError::InvalidArgument(format!(
            "cannot verify {}..{} in units of {}",
            start, stop, unit
        )));
    }

    let mut buf = vec![0u8; to_usize(unit)?];
    let mut report = IoReport::default();
    let units = (stop - start) / unit;

    for i in 0..units {
        let offset = start + i * unit;
        let n = sink.read_at(offset, &mut buf)?;
        if n < buf.len() {
            return Err(IoError::DataCheckFailed {
                offset,
                reason: format!("short read: {} of {} bytes", n, buf.len()),
            });
        }
        store.verify(&buf, offset)?;
        report.ops += 1;
        report.bytes += unit;
        report.verified_units += 1;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{PatternKind, PatternSpec};
    use crate::pool::RandomPool;
    use crate::seek::SeekOrder;
    use std::io::Cursor;
    use std::sync::Arc;

    fn tactic(unit: u64, pattern: PatternSpec, seek: SeekOrder) -> IoTactic {
        let pool = Arc::new(RandomPool::new(256 * 1024).unwrap());
        IoTactic::new(unit, pattern, seek, true, pool).unwrap()
    }

    #[test]
    fn test_write_then_verify_fixed() {
        let mut t = tactic(
            4096,
            PatternSpec::default_for(PatternKind::Fixed).unwrap(),
            SeekOrder::Sequential,
        );
        let mut sink = Cursor::new(Vec::new());
        let mut store = IntegrityStore::new();

        let written = write_region(&mut sink, &mut t, &mut store, 0, 10240).unwrap();
        assert_eq!(written.ops, 3);
        assert_eq!(written.bytes, 10240);
        assert_eq!(sink.get_ref().len(), 10240);

        let verified = verify_region(&mut sink, &t, &mut store, 0, 10240).unwrap();
        assert_eq!(verified.verified_units, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_random_reverse_round_trip() {
        let mut t = tactic(512, PatternSpec::Random, SeekOrder::Reverse);
        let mut sink = Cursor::new(Vec::new());
        let mut store = IntegrityStore::new();

        write_region(&mut sink, &mut t, &mut store, 0, 512 * 20 + 100).unwrap();
        let verified = verify_region(&mut sink, &t, &mut store, 0, 512 * 20 + 100).unwrap();
        assert_eq!(verified.verified_units, 20);
    }

    #[test]
    fn test_corruption_detected_and_store_cleared() {
        let mut t = tactic(1024, PatternSpec::Random, SeekOrder::Random);
        let mut sink = Cursor::new(Vec::new());
        let mut store = IntegrityStore::new();

        write_region(&mut sink, &mut t, &mut store, 0, 8192).unwrap();
        sink.get_mut()[3000] ^= 0xff;

        let err = verify_region(&mut sink, &t, &mut store, 0, 8192).unwrap_err();
        assert!(matches!(err, IoError::DataCheckFailed { offset: 2048, .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_short_region_fails_verification() {
        let t = tactic(
            1024,
            PatternSpec::default_for(PatternKind::Fixed).unwrap(),
            SeekOrder::Sequential,
        );
        let mut sink = Cursor::new(vec![0u8; 1500]);
        let mut store = IntegrityStore::new();
        let err = verify_region(&mut sink, &t, &mut store, 0, 2048).unwrap_err();
        assert!(matches!(err, IoError::DataCheckFailed { offset: 1024, .. }));
    }

    #[test]
    fn test_no_record_without_data_check() {
        let mut t = tactic(
            256,
            PatternSpec::default_for(PatternKind::Fixed).unwrap(),
            SeekOrder::Sequential,
        );
        t.set_data_check(false);
        let mut sink = Cursor::new(Vec::new());
        let mut store = IntegrityStore::new();
        write_region(&mut sink, &mut t, &mut store, 0, 1024).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_read_region_counts_bytes() {
        let t = tactic(
            100,
            PatternSpec::default_for(PatternKind::Fixed).unwrap(),
            SeekOrder::Reverse,
        );
        let mut sink = Cursor::new(vec![7u8; 1050]);
        let report = read_region(&mut sink, &t, 0, 1050).unwrap();
        assert_eq!(report.ops, 11);
        assert_eq!(report.bytes, 1050);
    }
}
