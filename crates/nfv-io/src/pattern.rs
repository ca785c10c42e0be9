//! Data pattern generators.
//!
//! Every generator returns exactly the requested number of bytes, except
//! [`PatternSpec::Compound`], whose length is the sum of its parts.

use std::fmt;
use std::ops::{Add, AddAssign, Deref};
use std::str::FromStr;
use std::sync::Arc;

use nfv_config::PatternConfig;

use crate::pool::RandomPool;
use crate::{IoError, Result};

/// Literal used by the fixed pattern when none is configured.
pub const DEFAULT_FIXED_LITERAL: &str = "content of data pattern is not important";

/// Smallest chunk the compressible pattern will build.
pub const MIN_COMPRESS_CHUNK: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Fixed,
    Random,
    Bit,
    Hex,
    Compress,
    Compound,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Fixed => "fixed",
            PatternKind::Random => "random",
            PatternKind::Bit => "bit",
            PatternKind::Hex => "hex",
            PatternKind::Compress => "compress",
            PatternKind::Compound => "compound",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternKind {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(PatternKind::Fixed),
            "random" => Ok(PatternKind::Random),
            "bit" => Ok(PatternKind::Bit),
            "hex" => Ok(PatternKind::Hex),
            "compress" => Ok(PatternKind::Compress),
            "compound" => Ok(PatternKind::Compound),
            other => Err(IoError::InvalidArgument(format!(
                "unknown data pattern: {}",
                other
            ))),
        }
    }
}

/// A pattern kind together with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSpec {
    Fixed { literal: Vec<u8> },
    Random,
    /// Up to eight `'0'`/`'1'` characters forming one byte.
    Bit { bits: String },
    /// Hex literal, e.g. `"deadbeef"`.
    Hex { value: String },
    Compress {
        /// Percentage (0..=100) of each chunk filled with `literal`.
        ratio: u8,
        chunks: usize,
        literal: Vec<u8>,
    },
    /// Parts generated at their own sizes and concatenated in order.
    Compound(Vec<(PatternSpec, usize)>),
}

impl PatternSpec {
    pub fn kind(&self) -> PatternKind {
        match self {
            PatternSpec::Fixed { .. } => PatternKind::Fixed,
            PatternSpec::Random => PatternKind::Random,
            PatternSpec::Bit { .. } => PatternKind::Bit,
            PatternSpec::Hex { .. } => PatternKind::Hex,
            PatternSpec::Compress { .. } => PatternKind::Compress,
            PatternSpec::Compound(_) => PatternKind::Compound,
        }
    }

    /// Default parameters for `kind`. Compound has none.
    pub fn default_for(kind: PatternKind) -> Result<Self> {
        Self::from_config(kind, &PatternConfig::default())
    }

    /// Parameters for `kind` taken from the `[pattern]` config section.
    pub fn from_config(kind: PatternKind, config: &PatternConfig) -> Result<Self> {
        let spec = match kind {
            PatternKind::Fixed => PatternSpec::Fixed {
                literal: config.fixed_literal.as_bytes().to_vec(),
            },
            PatternKind::Random => PatternSpec::Random,
            PatternKind::Bit => PatternSpec::Bit {
                bits: config.bits.clone(),
            },
            PatternKind::Hex => PatternSpec::Hex {
                value: config.hex_value.clone(),
            },
            PatternKind::Compress => PatternSpec::Compress {
                ratio: config.compress_ratio,
                chunks: config.compress_chunks,
                literal: config.compress_literal.as_bytes().to_vec(),
            },
            PatternKind::Compound => {
                return Err(IoError::InvalidArgument(
                    "compound pattern must be built from explicit parts".to_string(),
                ))
            }
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check parameters without generating anything.
    pub fn validate(&self) -> Result<()> {
        match self {
            PatternSpec::Fixed { literal } if literal.is_empty() => Err(IoError::InvalidArgument(
                "fixed pattern literal must not be empty".to_string(),
            )),
            PatternSpec::Bit { bits } => bits_to_byte(bits).map(|_| ()),
            PatternSpec::Hex { value } => decode_hex(value).map(|_| ()),
            PatternSpec::Compress {
                ratio,
                chunks,
                literal,
            } => {
                if *ratio > 100 {
                    return Err(IoError::InvalidArgument(format!(
                        "compress ratio {} is above 100",
                        ratio
                    )));
                }
                if *chunks == 0 {
                    return Err(IoError::InvalidArgument(
                        "compress pattern needs at least one chunk".to_string(),
                    ));
                }
                if literal.is_empty() {
                    return Err(IoError::InvalidArgument(
                        "compress literal must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
            PatternSpec::Compound(parts) => {
                if parts.is_empty() {
                    return Err(IoError::InvalidArgument(
                        "compound pattern has no parts".to_string(),
                    ));
                }
                parts.iter().try_for_each(|(spec, _)| spec.validate())
            }
            _ => Ok(()),
        }
    }

    /// Whether every access must produce fresh bytes.
    pub fn is_volatile(&self) -> bool {
        matches!(self, PatternSpec::Random)
    }

    /// Output length when it does not depend on the requested size.
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            PatternSpec::Compound(parts) => Some(parts.iter().map(|(_, size)| *size).sum()),
            _ => None,
        }
    }
}

/// An owned byte buffer produced by a generator.
///
/// `+` and `+=` concatenate, which is how compound patterns are assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataBuffer(Vec<u8>);

impl DataBuffer {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for DataBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for DataBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for DataBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for DataBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Add for DataBuffer {
    type Output = DataBuffer;

    fn add(mut self, rhs: DataBuffer) -> DataBuffer {
        self.0.extend_from_slice(&rhs.0);
        self
    }
}

impl AddAssign for DataBuffer {
    fn add_assign(&mut self, rhs: DataBuffer) {
        self.0.extend_from_slice(&rhs.0);
    }
}

impl AddAssign<&[u8]> for DataBuffer {
    fn add_assign(&mut self, rhs: &[u8]) {
        self.0.extend_from_slice(rhs);
    }
}

/// Generates pattern buffers, drawing random bytes from a shared pool.
#[derive(Debug, Clone)]
pub struct PatternGenerator {
    pool: Arc<RandomPool>,
}

impl PatternGenerator {
    pub fn new(pool: Arc<RandomPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<RandomPool> {
        &self.pool
    }

    /// Produce `size` bytes of `spec`. Compound ignores `size`.
    pub fn generate(&self, spec: &PatternSpec, size: usize) -> Result<DataBuffer> {
        let bytes = match spec {
            PatternSpec::Fixed { literal } => fixed_pattern(literal, size)?,
            PatternSpec::Random => self.pool.take_random(size),
            PatternSpec::Bit { bits } => bit_pattern(bits, size)?,
            PatternSpec::Hex { value } => hex_pattern(value, size)?,
            PatternSpec::Compress {
                ratio,
                chunks,
                literal,
            } => compress_pattern(&self.pool, literal, *ratio, *chunks, size)?,
            PatternSpec::Compound(parts) => {
                spec.validate()?;
                let mut out = DataBuffer::new();
                for (part, part_size) in parts {
                    out += self.generate(part, *part_size)?;
                }
                return Ok(out);
            }
        };
        Ok(DataBuffer(bytes))
    }
}

/// Repeat `unit` until `size` bytes, truncating the last repetition.
fn repeat_to(unit: &[u8], size: usize) -> Vec<u8> {
    if unit.len() >= size {
        return unit[..size].to_vec();
    }
    unit.iter().copied().cycle().take(size).collect()
}

pub fn fixed_pattern(literal: &[u8], size: usize) -> Result<Vec<u8>> {
    if literal.is_empty() {
        return Err(IoError::InvalidArgument(
            "fixed pattern literal must not be empty".to_string(),
        ));
    }
    Ok(repeat_to(literal, size))
}

/// Convert a `'0'`/`'1'` string to one byte.
///
/// Shorter strings are left-padded with zeros, longer ones keep their first
/// eight characters.
pub fn bits_to_byte(bits: &str) -> Result<u8> {
    if let Some(bad) = bits.chars().find(|c| *c != '0' && *c != '1') {
        return Err(IoError::InvalidArgument(format!(
            "bit pattern {:?} contains {:?}",
            bits, bad
        )));
    }
    let bits = &bits[..bits.len().min(8)];
    Ok(bits
        .bytes()
        .fold(0u8, |acc, b| (acc << 1) | (b - b'0')))
}

pub fn bit_pattern(bits: &str, size: usize) -> Result<Vec<u8>> {
    Ok(vec![bits_to_byte(bits)?; size])
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(value.trim())
        .map_err(|e| IoError::InvalidArgument(format!("hex pattern {:?}: {}", value, e)))?;
    if bytes.is_empty() {
        return Err(IoError::InvalidArgument(
            "hex pattern must not be empty".to_string(),
        ));
    }
    Ok(bytes)
}

pub fn hex_pattern(value: &str, size: usize) -> Result<Vec<u8>> {
    Ok(repeat_to(&decode_hex(value)?, size))
}

/// Build `chunks` chunks, each `ratio`% repeated literal then random bytes.
///
/// The last chunk absorbs `size % chunks` extra random bytes.
pub fn compress_pattern(
    pool: &RandomPool,
    literal: &[u8],
    ratio: u8,
    chunks: usize,
    size: usize,
) -> Result<Vec<u8>> {
    PatternSpec::Compress {
        ratio,
        chunks,
        literal: literal.to_vec(),
    }
    .validate()?;

    let chunk_size = size / chunks;
    if chunk_size < MIN_COMPRESS_CHUNK {
        return Err(IoError::InvalidArgument(format!(
            "compress chunk of {} bytes is below the {} byte minimum ({} bytes / {} chunks)",
            chunk_size, MIN_COMPRESS_CHUNK, size, chunks
        )));
    }

    let literal_len = chunk_size * ratio as usize / 100;
    let compressible = repeat_to(literal, literal_len);
    let mut out = Vec::with_capacity(size);
    for i in 0..chunks {
        let mut random_len = chunk_size - literal_len;
        if i + 1 == chunks {
            random_len += size % chunks;
        }
        out.extend_from_slice(&compressible);
        out.extend_from_slice(&pool.take_random(random_len));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> PatternGenerator {
        PatternGenerator::new(Arc::new(RandomPool::new(64 * 1024).unwrap()))
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("Fixed".parse::<PatternKind>().unwrap(), PatternKind::Fixed);
        assert_eq!(
            "compress".parse::<PatternKind>().unwrap(),
            PatternKind::Compress
        );
        assert!(matches!(
            "zebra".parse::<PatternKind>(),
            Err(IoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_fixed_truncates_and_repeats() {
        assert_eq!(fixed_pattern(b"abc", 2).unwrap(), b"ab");
        assert_eq!(fixed_pattern(b"abc", 7).unwrap(), b"abcabca");
        assert_eq!(fixed_pattern(b"abc", 0).unwrap(), b"");
        assert!(fixed_pattern(b"", 4).is_err());
    }

    #[test]
    fn test_bits_to_byte() {
        assert_eq!(bits_to_byte("10000001").unwrap(), 0x81);
        assert_eq!(bits_to_byte("101").unwrap(), 0x05);
        assert_eq!(bits_to_byte("111111110000").unwrap(), 0xff);
        assert_eq!(bits_to_byte("").unwrap(), 0x00);
        assert!(bits_to_byte("10201").is_err());
    }

    #[test]
    fn test_hex_pattern() {
        assert_eq!(hex_pattern("dead", 5).unwrap(), vec![0xde, 0xad, 0xde, 0xad, 0xde]);
        assert!(hex_pattern("abc", 4).is_err());
        assert!(hex_pattern("zz", 4).is_err());
        assert!(hex_pattern("", 4).is_err());
    }

    #[test]
    fn test_deterministic_patterns() {
        let gen = generator();
        for spec in [
            PatternSpec::default_for(PatternKind::Fixed).unwrap(),
            PatternSpec::Hex {
                value: "a5".to_string(),
            },
            PatternSpec::Bit {
                bits: "0110".to_string(),
            },
        ] {
            let a = gen.generate(&spec, 8192).unwrap();
            let b = gen.generate(&spec, 8192).unwrap();
            assert_eq!(a.len(), 8192);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_random_pattern_differs() {
        let gen = generator();
        let a = gen.generate(&PatternSpec::Random, 4096).unwrap();
        let b = gen.generate(&PatternSpec::Random, 4096).unwrap();
        assert_eq!(a.len(), 4096);
        assert_ne!(a, b);
    }

    #[test]
    fn test_compress_layout() {
        let gen = generator();
        let spec = PatternSpec::Compress {
            ratio: 50,
            chunks: 2,
            literal: b"ab".to_vec(),
        };
        let data = gen.generate(&spec, 4097).unwrap();
        assert_eq!(data.len(), 4097);
        // chunk size 2048: 1024 literal bytes at the start of each chunk
        assert!(data[..1024].chunks(2).all(|c| c == b"ab"));
        assert!(data[2048..3072].chunks(2).all(|c| c == b"ab"));
    }

    #[test]
    fn test_compress_chunk_too_small() {
        let gen = generator();
        let spec = PatternSpec::Compress {
            ratio: 50,
            chunks: 8,
            literal: b"abc".to_vec(),
        };
        assert!(matches!(
            gen.generate(&spec, 8192),
            Err(IoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_compress_rejects_bad_ratio() {
        let spec = PatternSpec::Compress {
            ratio: 101,
            chunks: 1,
            literal: b"a".to_vec(),
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_compound_concatenates() {
        let gen = generator();
        let spec = PatternSpec::Compound(vec![
            (
                PatternSpec::Hex {
                    value: "ff".to_string(),
                },
                3,
            ),
            (
                PatternSpec::Fixed {
                    literal: b"xy".to_vec(),
                },
                5,
            ),
        ]);
        assert_eq!(spec.fixed_len(), Some(8));
        let data = gen.generate(&spec, 1).unwrap();
        assert_eq!(&data[..], b"\xff\xff\xffxyxyx");
    }

    #[test]
    fn test_buffer_add() {
        let a = DataBuffer::from(b"ab".to_vec());
        let mut c = a + DataBuffer::from(b"cd".to_vec());
        c += &b"e"[..];
        assert_eq!(c.as_bytes(), b"abcde");
    }

    #[test]
    fn test_compound_has_no_default() {
        assert!(PatternSpec::default_for(PatternKind::Compound).is_err());
    }
}
