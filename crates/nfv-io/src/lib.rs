//! # nfv-io
//!
//! I/O tactic engine for the nfv NAS workload generator.
//!
//! A [`IoTactic`] bundles a unit size, a data pattern, a seek order and a
//! data-check flag. Driving it over a byte range produces an ordered sequence
//! of `(offset, data)` operations which the engine applies to a sink (a file,
//! a block device or an in-memory buffer), optionally recording content hashes
//! in an [`IntegrityStore`] and verifying them afterwards.
//!
//! ## Layout
//!
//! ```text
//! pool      ─ shared random byte pool
//! pattern   ─ fixed / random / bit / hex / compress / compound generators
//! seek      ─ sequential / reverse / random offset sequences
//! plan      ─ remainder policy, (offset, len) ops
//! tactic    ─ the configuration object tying the above together
//! integrity ─ write-time content hashes
//! sink      ─ positional I/O targets (file, memory, O_DIRECT)
//! engine    ─ write / read / verify passes
//! file      ─ workload files
//! block     ─ block devices
//! ```

pub mod block;
pub mod engine;
pub mod file;
pub mod integrity;
pub mod pattern;
pub mod plan;
pub mod pool;
pub mod seek;
pub mod sink;
pub mod tactic;

pub use block::BlockDevice;
pub use engine::{read_region, verify_region, write_region, IoReport};
pub use file::{random_name, IoFile};
pub use integrity::{content_hash, hash_to_hex, ContentHash, IntegrityStore};
pub use pattern::{DataBuffer, PatternGenerator, PatternKind, PatternSpec};
pub use plan::{IoOp, IoPlan};
pub use pool::RandomPool;
pub use seek::{SeekIndex, SeekOrder};
pub use sink::IoSink;
pub use tactic::{IoTactic, PropertyValue};

use std::io;

use nfv_config::SizeError;
use thiserror::Error;

/// Errors that can occur while generating or applying I/O
#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Data check failed at offset {offset}: {reason}")]
    DataCheckFailed { offset: u64, reason: String },
}

impl From<SizeError> for IoError {
    fn from(err: SizeError) -> Self {
        IoError::InvalidArgument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_error_is_invalid_argument() {
        let err: IoError = nfv_config::parse_size("8q").unwrap_err().into();
        assert!(matches!(err, IoError::InvalidArgument(_)));
    }

    #[test]
    fn test_error_display() {
        let err = IoError::DataCheckFailed {
            offset: 8192,
            reason: "short read".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Data check failed at offset 8192: short read"
        );
    }
}
