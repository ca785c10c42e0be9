//! # nfv-lock
//!
//! Byte-range locking workloads for the nfv NAS workload generator.
//!
//! Regions are laid out over a file by [`locate`] (or a parsed [`LockPlan`]),
//! each region becomes a [`ByteRangeLock`] that moves through
//! `Detached -> Off -> On` and back, and a [`LockManager`] drives a whole set
//! of them against one file. The OS primitive sits behind [`LockBackend`]:
//! `fcntl` record locks on POSIX, `LockFileEx` on Windows.
//!
//! ## Layout
//!
//! ```text
//! mode     ─ lock modes and the (lock type, blocking) table
//! region   ─ region allocator and lock strategies
//! backend  ─ platform lock primitives
//! lock     ─ single lock state machine
//! manager  ─ lock sets bound to one file
//! retry    ─ caller-level retry policy
//! ```

pub mod backend;
pub mod lock;
pub mod manager;
pub mod mode;
pub mod region;
pub mod retry;

pub use backend::{backend_for, create_backend, BackendKind, LockBackend};
pub use lock::{ByteRangeLock, LockState};
pub use manager::LockManager;
pub use mode::{LockKind, LockMode, LockRequest};
pub use region::{locate, LockPlan, LockRegion, LockStrategy, Locator};
pub use retry::{retry, RetryPolicy};

use std::io;

use nfv_config::SizeError;
use thiserror::Error;

/// Errors raised by the lock allocator, locks and backends
#[derive(Error, Debug)]
pub enum LockError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Data check failed at offset {offset}: expected {expected}, found {actual}")]
    DataCheckFailed {
        offset: u64,
        expected: String,
        actual: String,
    },
}

impl LockError {
    /// Lock conflicts and a full lock table. Worth another attempt after a wait.
    pub fn is_retryable(&self) -> bool {
        match self {
            LockError::Io(err) => {
                err.kind() == io::ErrorKind::WouldBlock
                    || err.raw_os_error().is_some_and(retryable_os_error)
            }
            _ => false,
        }
    }
}

#[cfg(unix)]
fn retryable_os_error(code: i32) -> bool {
    code == libc::EAGAIN || code == libc::EWOULDBLOCK || code == libc::EACCES || code == libc::ENOLCK
}

#[cfg(windows)]
fn retryable_os_error(code: i32) -> bool {
    use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, ERROR_SHARING_VIOLATION};
    let code = code as u32;
    code == ERROR_LOCK_VIOLATION || code == ERROR_SHARING_VIOLATION
}

#[cfg(not(any(unix, windows)))]
fn retryable_os_error(_code: i32) -> bool {
    false
}

impl From<SizeError> for LockError {
    fn from(err: SizeError) -> Self {
        LockError::InvalidArgument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
