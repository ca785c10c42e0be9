//! Lock modes and what each one asks of the OS.

use std::fmt;
use std::str::FromStr;

use crate::LockError;

/// How a lock is taken, and whether it carries data through the region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Write lock, fail fast
    Exclusive,
    /// Write lock, wait for conflicting holders
    ExclusiveBlk,
    /// Write lock, fail fast, then write the lock data into the region
    ExclusiveIo,
    /// Write lock, wait, then write the lock data into the region
    ExclusiveBlkIo,
    /// Write lock that waits on POSIX and fails fast on Windows. Lock data is
    /// compared with the region before locking.
    Shared,
    /// Release only. Never used to build a lock.
    Unlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Read,
    Write,
    Unlock,
}

/// Lock type plus blocking behavior handed to a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRequest {
    pub kind: LockKind,
    pub blocking: bool,
}

/// Shared waits for conflicting holders on POSIX and fails fast on Windows.
const SHARED_WAITS: bool = cfg!(not(windows));

impl LockRequest {
    pub const UNLOCK: LockRequest = LockRequest {
        kind: LockKind::Unlock,
        blocking: false,
    };
}

impl LockMode {
    pub const ALL: [LockMode; 6] = [
        LockMode::Exclusive,
        LockMode::ExclusiveBlk,
        LockMode::ExclusiveIo,
        LockMode::ExclusiveBlkIo,
        LockMode::Shared,
        LockMode::Unlock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Exclusive => "exclusive",
            LockMode::ExclusiveBlk => "exclusive_blk",
            LockMode::ExclusiveIo => "exclusive_io",
            LockMode::ExclusiveBlkIo => "exclusive_blk_io",
            LockMode::Shared => "shared",
            LockMode::Unlock => "unlock",
        }
    }

    pub fn request(self) -> LockRequest {
        match self {
            LockMode::Exclusive | LockMode::ExclusiveIo => LockRequest {
                kind: LockKind::Write,
                blocking: false,
            },
            LockMode::ExclusiveBlk | LockMode::ExclusiveBlkIo => LockRequest {
                kind: LockKind::Write,
                blocking: true,
            },
            LockMode::Shared => LockRequest {
                kind: LockKind::Write,
                blocking: SHARED_WAITS,
            },
            LockMode::Unlock => LockRequest::UNLOCK,
        }
    }

    /// `fcntl` lock type and whether `F_SETLKW` is used.
    #[cfg(unix)]
    pub fn posix_request(self) -> (libc::c_short, bool) {
        let request = self.request();
        (request.kind.posix_type(), request.blocking)
    }

    /// The `_io` modes write their data after locking.
    pub fn writes_data(self) -> bool {
        matches!(self, LockMode::ExclusiveIo | LockMode::ExclusiveBlkIo)
    }

    pub fn verifies_before_lock(self) -> bool {
        self == LockMode::Shared
    }
}

impl LockKind {
    #[cfg(unix)]
    pub fn posix_type(self) -> libc::c_short {
        match self {
            LockKind::Read => libc::F_RDLCK as libc::c_short,
            LockKind::Write => libc::F_WRLCK as libc::c_short,
            LockKind::Unlock => libc::F_UNLCK as libc::c_short,
        }
    }
}

impl FromStr for LockMode {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        LockMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| LockError::InvalidArgument(format!("unknown lock mode: {}", s)))
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
