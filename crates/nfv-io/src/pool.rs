//! Pre-allocated random byte pool.
//!
//! Random data is sliced out of a pool filled once at construction instead of
//! being drawn from the RNG for every I/O. Slices are cheap but not unique, and
//! the bytes are not suitable for anything cryptographic.

use rand::{Rng, RngCore};

use crate::{IoError, Result};

/// Default pool size (1 MiB).
pub const DEFAULT_POOL_SIZE: usize = 1 << 20;

/// Bytes at the end of the pool never handed out.
pub const POOL_MARGIN: usize = 33;

/// Immutable random byte pool, shared as `Arc<RandomPool>` between tactics.
#[derive(Debug)]
pub struct RandomPool {
    bytes: Vec<u8>,
}

impl RandomPool {
    /// Fill a pool of `size` bytes from the thread RNG.
    pub fn new(size: usize) -> Result<Self> {
        let mut bytes = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    /// Build a pool over caller-provided bytes (deterministic tests).
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() <= POOL_MARGIN + 1 {
            return Err(IoError::InvalidArgument(format!(
                "random pool of {} bytes leaves no usable window (margin is {})",
                bytes.len(),
                POOL_MARGIN
            )));
        }
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Largest slice handed out in one piece.
    pub fn window(&self) -> usize {
        self.bytes.len() - POOL_MARGIN
    }

    /// Take `size` bytes using the thread RNG.
    pub fn take_random(&self, size: usize) -> Vec<u8> {
        self.take(size, &mut rand::thread_rng())
    }

    /// Take `size` bytes starting at random offsets inside the window.
    ///
    /// A request that fits the window is served by a single slice starting at a
    /// uniform offset in `[0, window - size]`. Larger requests are assembled from
    /// the tail of the window following a random offset, then from fresh slices
    /// until `size` bytes are accumulated.
    pub fn take<R: Rng + ?Sized>(&self, size: usize, rng: &mut R) -> Vec<u8> {
        let window = self.window();
        let mut out = Vec::with_capacity(size);
        let mut remaining = size;
        let mut offset = rng.gen_range(0..window);

        while remaining > 0 {
            if remaining > window {
                let piece = &self.bytes[offset..window];
                out.extend_from_slice(piece);
                remaining -= piece.len();
                offset = 0;
            } else {
                let start = rng.gen_range(0..=window - remaining);
                out.extend_from_slice(&self.bytes[start..start + remaining]);
                remaining = 0;
            }
        }
        out
    }
}
