//! The I/O tactic: unit size, data pattern, seek order and data check.

use std::fmt;
use std::sync::Arc;

use nfv_config::{format_size, parse_flag, parse_size, Config};

use crate::pattern::{DataBuffer, PatternGenerator, PatternKind, PatternSpec};
use crate::plan::{IoOp, IoPlan};
use crate::pool::RandomPool;
use crate::seek::{SeekIndex, SeekOrder};
use crate::{IoError, Result};

/// Property names accepted by [`IoTactic::set_property`].
pub const PROPERTY_KEYS: [&str; 4] = ["unit_size", "data_pattern", "seek_type", "data_check"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Size(u64),
    Pattern(PatternKind),
    Seek(SeekOrder),
    Flag(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Size(bytes) => f.write_str(&format_size(*bytes)),
            PropertyValue::Pattern(kind) => fmt::Display::fmt(kind, f),
            PropertyValue::Seek(order) => fmt::Display::fmt(order, f),
            PropertyValue::Flag(flag) => fmt::Display::fmt(flag, f),
        }
    }
}

fn canonical_key(key: &str) -> Result<&'static str> {
    match key {
        "unit_size" | "io_size" => Ok("unit_size"),
        "data_pattern" => Ok("data_pattern"),
        "seek_type" => Ok("seek_type"),
        "data_check" => Ok("data_check"),
        other => Err(IoError::UnknownProperty(other.to_string())),
    }
}

/// Couples a pattern generator with a seek order, unit size and check flag.
///
/// Non-random patterns are generated once and cached; random patterns are
/// regenerated on every [`get_data_pattern`](IoTactic::get_data_pattern).
#[derive(Debug, Clone)]
pub struct IoTactic {
    unit_size: u64,
    pattern: PatternSpec,
    seek: SeekOrder,
    data_check: bool,
    generator: PatternGenerator,
    cached: Option<DataBuffer>,
}

impl IoTactic {
    /// Compound patterns set the unit size to the sum of their parts.
    pub fn new(
        unit_size: u64,
        pattern: PatternSpec,
        seek: SeekOrder,
        data_check: bool,
        pool: Arc<RandomPool>,
    ) -> Result<Self> {
        pattern.validate()?;
        let unit_size = match pattern.fixed_len() {
            Some(len) => len as u64,
            None => unit_size,
        };
        if unit_size == 0 {
            return Err(IoError::InvalidArgument(
                "I/O unit size must be greater than zero".to_string(),
            ));
        }

        let mut tactic = Self {
            unit_size,
            pattern,
            seek,
            data_check,
            generator: PatternGenerator::new(pool),
            cached: None,
        };
        tactic.regenerate()?;
        Ok(tactic)
    }

    /// Build from the `[tactic]` and `[pattern]` config sections.
    pub fn from_config(config: &Config, pool: Arc<RandomPool>) -> Result<Self> {
        let kind: PatternKind = config.tactic.data_pattern.parse()?;
        Self::new(
            parse_size(&config.tactic.io_size)?,
            PatternSpec::from_config(kind, &config.pattern)?,
            config.tactic.seek_type.parse()?,
            config.tactic.data_check,
            pool,
        )
    }

    pub fn unit_size(&self) -> u64 {
        self.unit_size
    }

    pub fn pattern(&self) -> &PatternSpec {
        &self.pattern
    }

    pub fn seek_order(&self) -> SeekOrder {
        self.seek
    }

    pub fn data_check(&self) -> bool {
        self.data_check
    }

    pub fn set_data_check(&mut self, enabled: bool) {
        self.data_check = enabled;
    }

    pub fn set_seek_order(&mut self, order: SeekOrder) {
        self.seek = order;
    }

    /// Replace the pattern and regenerate the cached buffer.
    ///
    /// On error the tactic is left unchanged.
    pub fn set_pattern(&mut self, pattern: PatternSpec) -> Result<()> {
        pattern.validate()?;
        let unit_size = match pattern.fixed_len() {
            Some(0) => {
                return Err(IoError::InvalidArgument(
                    "compound pattern parts add up to zero bytes".to_string(),
                ))
            }
            Some(len) => len as u64,
            None => self.unit_size,
        };
        let data = self.generate(&pattern, unit_size)?;
        self.unit_size = unit_size;
        self.pattern = pattern;
        self.cached = Some(data);
        Ok(())
    }

    /// Change the unit size and regenerate the cached buffer.
    ///
    /// On error the tactic is left unchanged.
    pub fn set_unit_size(&mut self, unit_size: u64) -> Result<()> {
        if unit_size == 0 {
            return Err(IoError::InvalidArgument(
                "I/O unit size must be greater than zero".to_string(),
            ));
        }
        if self.pattern.fixed_len().is_some() {
            return Err(IoError::InvalidArgument(
                "unit size of a compound pattern is the sum of its parts".to_string(),
            ));
        }
        let data = self.generate(&self.pattern, unit_size)?;
        self.unit_size = unit_size;
        self.cached = Some(data);
        Ok(())
    }

    fn generate(&self, pattern: &PatternSpec, unit_size: u64) -> Result<DataBuffer> {
        let size = usize::try_from(unit_size).map_err(|_| {
            IoError::InvalidArgument(format!("unit size {} is too large", unit_size))
        })?;
        self.generator.generate(pattern, size)
    }

    fn regenerate(&mut self) -> Result<()> {
        self.cached = Some(self.generate(&self.pattern, self.unit_size)?);
        Ok(())
    }

    /// Buffer for the next I/O, exactly `unit_size` bytes long.
    pub fn get_data_pattern(&mut self) -> Result<&DataBuffer> {
        if self.pattern.is_volatile() || self.cached.is_none() {
            self.regenerate()?;
        }
        self.cached
            .as_ref()
            .ok_or_else(|| IoError::InvalidArgument("no data pattern available".to_string()))
    }

    /// Use `data` as the buffer for every I/O; the unit size follows its length.
    ///
    /// Random patterns regenerate on every access, so they refuse a fixed buffer.
    pub fn set_data_pattern(&mut self, data: DataBuffer) -> Result<()> {
        if data.is_empty() {
            return Err(IoError::InvalidArgument(
                "data pattern must not be empty".to_string(),
            ));
        }
        if self.pattern.is_volatile() {
            return Err(IoError::InvalidArgument(format!(
                "{} pattern is regenerated on every access and cannot hold a fixed buffer",
                self.pattern.kind()
            )));
        }
        self.unit_size = data.len() as u64;
        self.cached = Some(data);
        Ok(())
    }

    /// Drop the cached buffer; the next access regenerates it.
    pub fn clear_data_pattern(&mut self) {
        self.cached = None;
    }

    pub fn seek_to(&self, start: u64, stop: u64) -> Result<SeekIndex> {
        SeekIndex::new(start, stop, self.unit_size, self.seek)
    }

    pub fn plan(&self, start: u64, stop: u64) -> Result<IoPlan> {
        Ok(IoPlan::from_index(self.seek_to(start, stop)?))
    }

    /// The ordered `(op, data)` sequence for `[start, stop)`.
    ///
    /// `data` is the full unit buffer; only its first `op.len` bytes belong at
    /// `op.offset`.
    pub fn operations(&mut self, start: u64, stop: u64) -> Result<Operations<'_>> {
        let plan = self.plan(start, stop)?;
        Ok(Operations { tactic: self, plan })
    }

    pub fn get_property(&self, key: &str) -> Result<PropertyValue> {
        Ok(match canonical_key(key)? {
            "unit_size" => PropertyValue::Size(self.unit_size),
            "data_pattern" => PropertyValue::Pattern(self.pattern.kind()),
            "seek_type" => PropertyValue::Seek(self.seek),
            _ => PropertyValue::Flag(self.data_check),
        })
    }

    /// Set a property from its string form.
    ///
    /// `unit_size` accepts size strings (`"8k"`); `data_pattern` switches to the
    /// default parameters of the named kind.
    pub fn set_property(&mut self, key: &str, value: &str) -> Result<()> {
        match canonical_key(key)? {
            "unit_size" => self.set_unit_size(parse_size(value)?),
            "data_pattern" => {
                let kind: PatternKind = value.parse()?;
                self.set_pattern(PatternSpec::default_for(kind)?)
            }
            "seek_type" => {
                self.seek = value.parse()?;
                Ok(())
            }
            _ => {
                self.data_check = parse_flag(value).ok_or_else(|| {
                    IoError::InvalidArgument(format!("data_check expects a flag, got {:?}", value))
                })?;
                Ok(())
            }
        }
    }

    pub fn properties(&self) -> Vec<(&'static str, PropertyValue)> {
        vec![
            ("unit_size", PropertyValue::Size(self.unit_size)),
            ("data_pattern", PropertyValue::Pattern(self.pattern.kind())),
            ("seek_type", PropertyValue::Seek(self.seek)),
            ("data_check", PropertyValue::Flag(self.data_check)),
        ]
    }
}

/// Iterator returned by [`IoTactic::operations`].
pub struct Operations<'a> {
    tactic: &'a mut IoTactic,
    plan: IoPlan,
}

impl Iterator for Operations<'_> {
    type Item = Result<(IoOp, DataBuffer)>;

    fn next(&mut self) -> Option<Self::Item> {
        let op = self.plan.next()?;
        Some(self.tactic.get_data_pattern().map(|data| (op, data.clone())))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.plan.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{verify_region, write_region};
    use crate::integrity::IntegrityStore;
    use std::io::Cursor;

    fn pool() -> Arc<RandomPool> {
        Arc::new(RandomPool::new(64 * 1024).unwrap())
    }

    fn fixed_tactic(unit: u64) -> IoTactic {
        IoTactic::new(
            unit,
            PatternSpec::default_for(PatternKind::Fixed).unwrap(),
            SeekOrder::Sequential,
            true,
            pool(),
        )
        .unwrap()
    }

    #[test]
    fn test_from_default_config() {
        let tactic = IoTactic::from_config(&Config::default(), pool()).unwrap();
        assert_eq!(tactic.unit_size(), 8192);
        assert_eq!(tactic.pattern().kind(), PatternKind::Fixed);
        assert_eq!(tactic.seek_order(), SeekOrder::Sequential);
        assert!(tactic.data_check());
    }

    #[test]
    fn test_fixed_pattern_is_cached() {
        let mut tactic = fixed_tactic(4096);
        let a = tactic.get_data_pattern().unwrap().clone();
        let b = tactic.get_data_pattern().unwrap().clone();
        assert_eq!(a.len(), 4096);
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_pattern_regenerates() {
        let mut tactic =
            IoTactic::new(4096, PatternSpec::Random, SeekOrder::Random, false, pool()).unwrap();
        let a = tactic.get_data_pattern().unwrap().clone();
        let b = tactic.get_data_pattern().unwrap().clone();
        assert_eq!(b.len(), 4096);
        assert_ne!(a, b);
    }

    #[test]
    fn test_set_unit_size_from_string() {
        let mut tactic = fixed_tactic(4096);
        tactic.set_property("io_size", "1k").unwrap();
        assert_eq!(tactic.get_property("unit_size").unwrap(), PropertyValue::Size(1024));
        assert_eq!(tactic.get_data_pattern().unwrap().len(), 1024);
        assert!(matches!(
            tactic.set_property("unit_size", "eight"),
            Err(IoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unknown_property() {
        let mut tactic = fixed_tactic(4096);
        assert!(matches!(
            tactic.set_property("color", "blue"),
            Err(IoError::UnknownProperty(_))
        ));
        assert!(matches!(
            tactic.get_property("color"),
            Err(IoError::UnknownProperty(_))
        ));
    }

    #[test]
    fn test_set_pattern_and_seek_properties() {
        let mut tactic = fixed_tactic(512);
        tactic.set_property("data_pattern", "hex").unwrap();
        tactic.set_property("seek_type", "reverse").unwrap();
        tactic.set_property("data_check", "off").unwrap();
        assert_eq!(tactic.get_data_pattern().unwrap().as_bytes(), &[0u8; 512][..]);
        assert_eq!(tactic.seek_order(), SeekOrder::Reverse);
        assert!(!tactic.data_check());
        assert_eq!(tactic.properties().len(), PROPERTY_KEYS.len());
    }

    #[test]
    fn test_set_data_pattern_sets_unit_size() {
        let mut tactic = fixed_tactic(4096);
        tactic
            .set_data_pattern(DataBuffer::from(b"0123456789".to_vec()))
            .unwrap();
        assert_eq!(tactic.unit_size(), 10);
        assert_eq!(tactic.get_data_pattern().unwrap().as_bytes(), b"0123456789");

        tactic.clear_data_pattern();
        assert_eq!(tactic.get_data_pattern().unwrap().len(), 10);
    }

    fn compress_tactic(unit: u64) -> IoTactic {
        IoTactic::new(
            unit,
            PatternSpec::default_for(PatternKind::Compress).unwrap(),
            SeekOrder::Sequential,
            true,
            pool(),
        )
        .unwrap()
    }

    #[test]
    fn test_failed_unit_size_change_keeps_tactic() {
        // Compress chunks must be at least 1 KiB
        let mut tactic = compress_tactic(8192);
        assert!(tactic.set_property("unit_size", "512").is_err());
        assert_eq!(tactic.unit_size(), 8192);
        assert_eq!(tactic.get_data_pattern().unwrap().len(), 8192);

        let mut store = IntegrityStore::new();
        let mut sink = Cursor::new(Vec::new());
        write_region(&mut sink, &mut tactic, &mut store, 0, 16384).unwrap();
        let report = verify_region(&mut sink, &tactic, &mut store, 0, 16384).unwrap();
        assert_eq!(report.verified_units, 2);
    }

    #[test]
    fn test_failed_pattern_change_keeps_tactic() {
        let mut tactic = fixed_tactic(512);
        let before = tactic.get_data_pattern().unwrap().clone();
        assert!(tactic.set_property("data_pattern", "compress").is_err());
        assert_eq!(tactic.pattern().kind(), PatternKind::Fixed);
        assert_eq!(tactic.unit_size(), 512);
        assert_eq!(tactic.get_data_pattern().unwrap(), &before);
    }

    #[test]
    fn test_random_pattern_refuses_fixed_buffer() {
        let mut tactic =
            IoTactic::new(64, PatternSpec::Random, SeekOrder::Sequential, false, pool()).unwrap();
        assert!(matches!(
            tactic.set_data_pattern(DataBuffer::from(vec![7u8; 10])),
            Err(IoError::InvalidArgument(_))
        ));
        assert_eq!(tactic.unit_size(), 64);
    }

    #[test]
    fn test_compound_unit_size() {
        let spec = PatternSpec::Compound(vec![
            (PatternSpec::Random, 100),
            (
                PatternSpec::Bit {
                    bits: "1".to_string(),
                },
                28,
            ),
        ]);
        let mut tactic = IoTactic::new(4096, spec, SeekOrder::Sequential, true, pool()).unwrap();
        assert_eq!(tactic.unit_size(), 128);
        assert!(tactic.set_unit_size(64).is_err());
        assert_eq!(&tactic.get_data_pattern().unwrap()[100..], &[1u8; 28][..]);
    }

    #[test]
    fn test_operations_scenario() {
        let mut tactic = fixed_tactic(4096);
        let ops: Vec<(u64, u64, usize)> = tactic
            .operations(0, 10 * 1024)
            .unwrap()
            .map(|r| {
                let (op, data) = r.unwrap();
                (op.offset, op.len, data.len())
            })
            .collect();
        assert_eq!(
            ops,
            vec![(0, 4096, 4096), (4096, 4096, 4096), (8192, 2048, 4096)]
        );
    }
}
