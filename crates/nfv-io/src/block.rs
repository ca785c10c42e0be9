//! Block devices (or any seekable path) written over an explicit range.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use nfv_config::log_io_info;

use crate::engine::{read_region, verify_region, write_region, IoReport};
use crate::integrity::IntegrityStore;
use crate::sink::{IoSink, DIRECT_IO_ALIGN};
use crate::tactic::IoTactic;
use crate::{IoError, Result};

#[derive(Debug, Clone)]
pub struct BlockDevice {
    path: PathBuf,
    size: u64,
    direct: bool,
}

impl BlockDevice {
    /// Open `path` and size it by seeking to the end, which also works for
    /// device nodes whose metadata reports zero length.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut handle = File::open(&path)?;
        let size = handle.seek(SeekFrom::End(0))?;
        Ok(Self {
            path,
            size,
            direct: false,
        })
    }

    /// Bypass the page cache (`O_DIRECT`, Linux only).
    pub fn with_direct_io(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_direct(&self) -> bool {
        self.direct
    }

    /// Clamp `stop` to the device and reject ranges that start past it.
    pub fn resolve_range(&self, start: u64, stop: u64) -> Result<(u64, u64)> {
        if start > self.size {
            return Err(IoError::InvalidArgument(format!(
                "start offset {} is beyond the {} byte device",
                start, self.size
            )));
        }
        let stop = stop.min(self.size);
        if stop < start {
            return Err(IoError::InvalidArgument(format!(
                "stop offset {} is before start offset {}",
                stop, start
            )));
        }
        Ok((start, stop))
    }

    fn check_direct(&self, tactic: &IoTactic, start: u64, stop: u64) -> Result<()> {
        let aligned = |v: u64| v % DIRECT_IO_ALIGN == 0;
        if !aligned(tactic.unit_size()) || !aligned(start) || !aligned(stop - start) {
            return Err(IoError::InvalidArgument(format!(
                "direct I/O needs {}-byte alignment (unit {}, range {}..{})",
                DIRECT_IO_ALIGN,
                tactic.unit_size(),
                start,
                stop
            )));
        }
        Ok(())
    }

    fn with_sink<T>(
        &self,
        write: bool,
        unit: u64,
        f: impl FnOnce(&mut dyn IoSink) -> Result<T>,
    ) -> Result<T> {
        if self.direct {
            #[cfg(target_os = "linux")]
            {
                let max_io = usize::try_from(unit).map_err(|_| {
                    IoError::InvalidArgument("unit size too large for direct I/O".to_string())
                })?;
                let mut sink = crate::sink::DirectSink::open(&self.path, write, max_io)?;
                return f(&mut sink);
            }
            #[cfg(not(target_os = "linux"))]
            {
                let _ = unit;
                return Err(IoError::InvalidArgument(
                    "direct I/O is only supported on Linux".to_string(),
                ));
            }
        }
        let mut handle = File::options().read(true).write(write).open(&self.path)?;
        f(&mut handle)
    }

    /// Write `[start, stop)` and verify it when data check is enabled.
    pub fn write(
        &self,
        tactic: &mut IoTactic,
        store: &mut IntegrityStore,
        start: u64,
        stop: u64,
    ) -> Result<IoReport> {
        let (start, stop) = self.resolve_range(start, stop)?;
        if self.direct {
            self.check_direct(tactic, start, stop)?;
        }

        let unit = tactic.unit_size();
        let mut report = self.with_sink(true, unit, |sink| {
            write_region(sink, tactic, store, start, stop)
        })?;
        if tactic.data_check() {
            report.merge(self.verify(tactic, store, start, stop)?);
        }
        log_io_info!(
            "Block range written",
            device = tracing::field::display(self.path.display()),
            start = start,
            stop = stop,
            bytes = report.bytes,
        );
        Ok(report)
    }

    pub fn read(&self, tactic: &IoTactic, start: u64, stop: u64) -> Result<IoReport> {
        let (start, stop) = self.resolve_range(start, stop)?;
        if self.direct {
            self.check_direct(tactic, start, stop)?;
        }
        self.with_sink(false, tactic.unit_size(), |sink| {
            read_region(sink, tactic, start, stop)
        })
    }

    pub fn verify(
        &self,
        tactic: &IoTactic,
        store: &mut IntegrityStore,
        start: u64,
        stop: u64,
    ) -> Result<IoReport> {
        let (start, stop) = self.resolve_range(start, stop)?;
        if self.direct {
            self.check_direct(tactic, start, stop)?;
        }
        self.with_sink(false, tactic.unit_size(), |sink| {
            verify_region(sink, tactic, store, start, stop)
        })
    }
}
