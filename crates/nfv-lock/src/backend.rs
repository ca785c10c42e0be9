//! Platform lock primitives.
//!
//! Lock and lock-manager code talks to [`LockBackend`] only. The
//! `create_backend()` factory picks the primitive native to the build target:
//!
//! - POSIX: `fcntl` advisory record locks (`F_SETLK` / `F_SETLKW`)
//! - Windows: `LockFileEx` / `UnlockFileEx`
//!
//! POSIX coalesces adjacent ranges held by one process into a single lock,
//! Windows keeps every range separate. [`LockBackend::merges_adjacent`]
//! reports which behavior applies so layouts can compensate.

use std::fmt;
use std::fs::File;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use nfv_config::log_lock_debug;

use crate::mode::LockRequest;
use crate::region::LockRegion;
use crate::{LockError, Result};

/// Byte-range locking primitive over an open file
pub trait LockBackend: Send + Sync {
    /// Take `region` with the lock type and blocking behavior in `request`.
    fn acquire(&self, file: &File, region: LockRegion, request: LockRequest) -> io::Result<()>;

    /// Release `region`.
    fn release(&self, file: &File, region: LockRegion) -> io::Result<()>;

    /// Whether adjacent ranges held by this process collapse into one lock.
    fn merges_adjacent(&self) -> bool;

    /// Get the backend name for logging/debugging
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Posix,
    Windows,
}

impl BackendKind {
    pub fn native() -> Self {
        if cfg!(windows) {
            BackendKind::Windows
        } else {
            BackendKind::Posix
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Posix => "posix",
            BackendKind::Windows => "windows",
        }
    }
}

impl FromStr for BackendKind {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "posix" | "fcntl" => Ok(BackendKind::Posix),
            "windows" | "lockfileex" => Ok(BackendKind::Windows),
            other => Err(LockError::InvalidArgument(format!(
                "unknown lock backend: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// POSIX fcntl record locks
// ============================================================================

#[cfg(unix)]
mod posix {
    use super::*;
    use std::os::unix::io::AsRawFd;

    use nix::errno::Errno;
    use nix::fcntl::{fcntl, FcntlArg};

    use crate::mode::LockKind;

    fn out_of_range(what: &str, value: u64) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("lock {} {} does not fit off_t", what, value),
        )
    }

    /// `fcntl` advisory record locks
    ///
    /// Locks belong to the process, not the descriptor: closing any descriptor
    /// of the file drops every lock the process holds on it.
    #[derive(Debug, Default)]
    pub struct PosixBackend;

    impl PosixBackend {
        pub fn new() -> Self {
            Self
        }

        fn set_lock(
            &self,
            file: &File,
            region: LockRegion,
            kind: LockKind,
            blocking: bool,
        ) -> io::Result<()> {
            // SAFETY: flock is plain old data, all-zero is a valid value
            let mut fl: libc::flock = unsafe { std::mem::zeroed() };
            fl.l_type = kind.posix_type();
            fl.l_whence = libc::SEEK_SET as libc::c_short;
            fl.l_start = libc::off_t::try_from(region.offset)
                .map_err(|_| out_of_range("offset", region.offset))?;
            fl.l_len = libc::off_t::try_from(region.length)
                .map_err(|_| out_of_range("length", region.length))?;

            let fd = file.as_raw_fd();
            loop {
                let arg = if blocking {
                    FcntlArg::F_SETLKW(&fl)
                } else {
                    FcntlArg::F_SETLK(&fl)
                };
                match fcntl(fd, arg) {
                    Ok(_) => return Ok(()),
                    // A signal interrupted F_SETLKW, wait again
                    Err(Errno::EINTR) => continue,
                    Err(errno) => return Err(io::Error::from(errno)),
                }
            }
        }
    }

    impl LockBackend for PosixBackend {
        fn acquire(&self, file: &File, region: LockRegion, request: LockRequest) -> io::Result<()> {
            self.set_lock(file, region, request.kind, request.blocking)
        }

        fn release(&self, file: &File, region: LockRegion) -> io::Result<()> {
            self.set_lock(file, region, LockKind::Unlock, false)
        }

        fn merges_adjacent(&self) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "posix_fcntl"
        }
    }
}

// ============================================================================
// Windows LockFileEx
// ============================================================================

#[cfg(windows)]
mod windows {
    use super::*;
    use std::os::windows::io::AsRawHandle;

    use windows_sys::Win32::Foundation::HANDLE;
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, UnlockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };
    use windows_sys::Win32::System::IO::OVERLAPPED;

    use crate::mode::LockKind;

    /// `LockFileEx` range locks. Adjacent ranges stay separate locks.
    #[derive(Debug, Default)]
    pub struct WindowsBackend;

    impl WindowsBackend {
        pub fn new() -> Self {
            Self
        }
    }

    fn overlapped_at(offset: u64) -> OVERLAPPED {
        // SAFETY: OVERLAPPED is plain old data, all-zero is a valid value
        unsafe {
            let mut overlapped: OVERLAPPED = std::mem::zeroed();
            overlapped.Anonymous.Anonymous.Offset = offset as u32;
            overlapped.Anonymous.Anonymous.OffsetHigh = (offset >> 32) as u32;
            overlapped
        }
    }

    impl LockBackend for WindowsBackend {
        fn acquire(&self, file: &File, region: LockRegion, request: LockRequest) -> io::Result<()> {
            if request.kind == LockKind::Unlock {
                return self.release(file, region);
            }
            let mut flags = 0;
            if request.kind == LockKind::Write {
                flags |= LOCKFILE_EXCLUSIVE_LOCK;
            }
            if !request.blocking {
                flags |= LOCKFILE_FAIL_IMMEDIATELY;
            }

            let mut overlapped = overlapped_at(region.offset);
            // SAFETY: the handle is open for the lifetime of `file` and
            // `overlapped` outlives the synchronous call
            let ok = unsafe {
                LockFileEx(
                    file.as_raw_handle() as HANDLE,
                    flags,
                    0,
                    region.length as u32,
                    (region.length >> 32) as u32,
                    &mut overlapped,
                )
            };
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        fn release(&self, file: &File, region: LockRegion) -> io::Result<()> {
            let mut overlapped = overlapped_at(region.offset);
            // SAFETY: see acquire
            let ok = unsafe {
                UnlockFileEx(
                    file.as_raw_handle() as HANDLE,
                    0,
                    region.length as u32,
                    (region.length >> 32) as u32,
                    &mut overlapped,
                )
            };
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        fn merges_adjacent(&self) -> bool {
            false
        }

        fn name(&self) -> &'static str {
            "windows_lockfileex"
        }
    }
}

#[cfg(unix)]
pub use posix::PosixBackend;
#[cfg(windows)]
pub use windows::WindowsBackend;

/// Factory function to create the native backend for the current platform
pub fn create_backend() -> Result<Arc<dyn LockBackend>> {
    backend_for(BackendKind::native())
}

/// Select a backend explicitly. Backends not built for this target are rejected.
pub fn backend_for(kind: BackendKind) -> Result<Arc<dyn LockBackend>> {
    let backend: Arc<dyn LockBackend> = match kind {
        #[cfg(unix)]
        BackendKind::Posix => Arc::new(PosixBackend::new()),
        #[cfg(windows)]
        BackendKind::Windows => Arc::new(WindowsBackend::new()),
        other => {
            return Err(LockError::InvalidArgument(format!(
                "lock backend {} is not available on this platform",
                other
            )))
        }
    };
    log_lock_debug!("Lock backend selected", backend = backend.name());
    Ok(backend)
}
