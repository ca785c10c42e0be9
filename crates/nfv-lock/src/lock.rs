//! A single byte-range lock and its state machine.
//!
//! ```text
//!  Detached ──attach──▶ Off ──on──▶ On
//!     ▲                  │ ▲        │
//!     └──────detach──────┘ └───off──┘
//! ```
//!
//! `wipe` releases and detaches from any state.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nfv_config::{log_lock_debug, log_lock_warn};
use tracing::field::display;
use tracing::instrument;

use crate::backend::{create_backend, LockBackend};
use crate::mode::LockMode;
use crate::region::LockRegion;
use crate::{LockError, Result};

/// Bytes of expected and actual data kept in a data-check error
const PREVIEW_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Detached,
    Off,
    On,
}

struct Attachment {
    path: PathBuf,
    file: Arc<File>,
}

/// A lock over one region of one file
pub struct ByteRangeLock {
    region: LockRegion,
    mode: LockMode,
    data: Option<Vec<u8>>,
    backend: Arc<dyn LockBackend>,
    attachment: Option<Attachment>,
    locked: bool,
}

impl ByteRangeLock {
    /// Create a detached lock on the native backend.
    ///
    /// `data` is cut to the region length. `Unlock` and empty regions are rejected.
    pub fn new(region: LockRegion, mode: LockMode, data: Option<Vec<u8>>) -> Result<Self> {
        Self::with_backend(region, mode, data, create_backend()?)
    }

    pub fn with_backend(
        region: LockRegion,
        mode: LockMode,
        data: Option<Vec<u8>>,
        backend: Arc<dyn LockBackend>,
    ) -> Result<Self> {
        if mode == LockMode::Unlock {
            return Err(LockError::InvalidArgument(
                "unlock is not a mode a lock can be created with".to_string(),
            ));
        }
        if region.length == 0 {
            return Err(LockError::InvalidArgument(format!(
                "lock region at {} is empty",
                region.offset
            )));
        }
        let data = data
            .map(|mut bytes| {
                let limit = usize::try_from(region.length).unwrap_or(usize::MAX);
                bytes.truncate(limit);
                bytes
            })
            .filter(|bytes| !bytes.is_empty());

        Ok(Self {
            region,
            mode,
            data,
            backend,
            attachment: None,
            locked: false,
        })
    }

    /// Locks are identified by their start offset.
    pub fn id(&self) -> u64 {
        self.region.offset
    }

    pub fn region(&self) -> LockRegion {
        self.region
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.attachment.as_ref().map(|a| a.path.as_path())
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn state(&self) -> LockState {
        match (&self.attachment, self.locked) {
            (None, _) => LockState::Detached,
            (Some(_), false) => LockState::Off,
            (Some(_), true) => LockState::On,
        }
    }

    /// Open `path` read-write and attach to it.
    ///
    /// The lock owns the handle it opens. On POSIX, closing any handle on a
    /// file drops every record lock the process holds on it, so detaching or
    /// dropping this lock also releases other locks on the same file even
    /// though they still report `On`. Locks that coexist on one file should
    /// share a handle through [`attach_handle`](Self::attach_handle), as
    /// [`LockManager`](crate::LockManager) does.
    pub fn attach(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_detached()?;
        let path = path.as_ref().to_path_buf();
        let file = File::options().read(true).write(true).open(&path)?;
        self.attachment = Some(Attachment {
            path,
            file: Arc::new(file),
        });
        Ok(())
    }

    /// Attach to a handle shared with other locks on the same file.
    pub fn attach_handle(&mut self, path: impl AsRef<Path>, file: Arc<File>) -> Result<()> {
        self.ensure_detached()?;
        self.attachment = Some(Attachment {
            path: path.as_ref().to_path_buf(),
            file,
        });
        Ok(())
    }

    fn ensure_detached(&self) -> Result<()> {
        if let Some(attachment) = &self.attachment {
            return Err(LockError::InvalidState(format!(
                "lock {} is already attached to {}",
                self.id(),
                attachment.path.display()
            )));
        }
        Ok(())
    }

    fn file(&self) -> Result<&File> {
        self.attachment
            .as_ref()
            .map(|a| a.file.as_ref())
            .ok_or_else(|| {
                LockError::InvalidState(format!("lock {} is not attached to a file", self.id()))
            })
    }

    /// Switch the lock on.
    ///
    /// `Shared` compares its data with the region before locking. The `_io`
    /// modes write their data into the region once the lock is held.
    #[instrument(skip(self), fields(offset = self.region.offset, length = self.region.length, mode = %self.mode), level = "debug")]
    pub fn on(&mut self) -> Result<()> {
        let file = self.file()?;
        if self.locked {
            return Err(LockError::InvalidState(format!(
                "lock {} is already on",
                self.id()
            )));
        }

        if let Some(data) = self.data.as_deref() {
            if self.mode.verifies_before_lock() {
                check_region(file, self.region.offset, data)?;
            }
        }

        self.backend.acquire(file, self.region, self.mode.request())?;

        if let Some(data) = self.data.as_deref() {
            if self.mode.writes_data() {
                if let Err(err) = write_region(file, self.region.offset, data) {
                    if let Err(release_err) = self.backend.release(file, self.region) {
                        log_lock_warn!(
                            "Release after failed lock write failed",
                            offset = self.region.offset,
                            error = display(&release_err),
                        );
                    }
                    return Err(err.into());
                }
            }
        }

        self.locked = true;
        log_lock_debug!(
            "Lock on",
            offset = self.region.offset,
            length = self.region.length,
            backend = self.backend.name(),
        );
        Ok(())
    }

    /// Switch the lock off.
    ///
    /// Data written by an `_io` mode is read back and compared first. The
    /// region is released either way. Switching off a lock that is already
    /// off does nothing.
    #[instrument(skip(self), fields(offset = self.region.offset, length = self.region.length, mode = %self.mode), level = "debug")]
    pub fn off(&mut self) -> Result<()> {
        let file = self.file()?;
        if !self.locked {
            return Ok(());
        }

        let checked = match self.data.as_deref() {
            Some(data) if self.mode.writes_data() => check_region(file, self.region.offset, data),
            _ => Ok(()),
        };

        self.backend.release(file, self.region)?;
        self.locked = false;
        log_lock_debug!("Lock off", offset = self.region.offset);
        checked
    }

    /// Close the file. The lock must be off.
    pub fn detach(&mut self) -> Result<()> {
        if self.locked {
            return Err(LockError::InvalidState(format!(
                "lock {} is on, switch it off before detaching",
                self.id()
            )));
        }
        self.attachment = None;
        Ok(())
    }

    /// Release without checking data, then detach.
    pub fn wipe(&mut self) -> Result<()> {
        let released = match (&self.attachment, self.locked) {
            (Some(attachment), true) => self.backend.release(&attachment.file, self.region),
            _ => Ok(()),
        };
        self.locked = false;
        self.attachment = None;
        released.map_err(LockError::from)
    }
}

impl Drop for ByteRangeLock {
    fn drop(&mut self) {
        if let (Some(attachment), true) = (&self.attachment, self.locked) {
            if let Err(err) = self.backend.release(&attachment.file, self.region) {
                log_lock_warn!(
                    "Failed to release lock on drop",
                    offset = self.region.offset,
                    error = display(&err),
                );
            }
        }
    }
}

impl std::fmt::Debug for ByteRangeLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteRangeLock")
            .field("region", &self.region)
            .field("mode", &self.mode)
            .field("data_len", &self.data.as_ref().map(Vec::len))
            .field("backend", &self.backend.name())
            .field("path", &self.path())
            .field("state", &self.state())
            .finish()
    }
}

fn preview(bytes: &[u8]) -> String {
    if bytes.len() > PREVIEW_BYTES {
        format!("{}.. ({} bytes)", hex::encode(&bytes[..PREVIEW_BYTES]), bytes.len())
    } else {
        hex::encode(bytes)
    }
}

/// Fails with `DataCheckFailed` unless the file holds `expected` at `offset`.
fn check_region(file: &File, offset: u64, expected: &[u8]) -> Result<()> {
    let actual = read_region(file, offset, expected.len())?;
    if actual != expected {
        return Err(LockError::DataCheckFailed {
            offset,
            expected: preview(expected),
            actual: preview(&actual),
        });
    }
    Ok(())
}

#[cfg(unix)]
fn write_region(file: &File, offset: u64, data: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn write_region(file: &File, mut offset: u64, mut data: &[u8]) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        let n = file.seek_write(data, offset)?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        data = &data[n..];
        offset += n as u64;
    }
    Ok(())
}

/// Read up to `len` bytes at `offset`. Short at end of file.
fn read_region(file: &File, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    #[cfg(unix)]
    use std::os::unix::fs::FileExt;
    #[cfg(windows)]
    use std::os::windows::fs::FileExt;

    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        #[cfg(unix)]
        let n = file.read_at(&mut buf[filled..], offset + filled as u64)?;
        #[cfg(windows)]
        let n = file.seek_read(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
