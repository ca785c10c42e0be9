//! I/O tactic flags shared by the file and block commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use nfv_config::{log_cli_debug, parse_size, Config};
use nfv_io::{IoReport, IoTactic, RandomPool};
use tracing::field::display;

#[derive(Args, Debug, Default, Clone)]
pub struct TacticArgs {
    /// I/O unit size ("512", "8k", "1m", ...)
    #[arg(long, value_name = "SIZE")]
    pub io_size: Option<String>,

    /// Data pattern: fixed, random, bit, hex or compress
    #[arg(long, value_name = "KIND")]
    pub pattern: Option<String>,

    /// Seek order: sequential, reverse or random
    #[arg(long, value_name = "ORDER")]
    pub seek: Option<String>,

    /// Skip recording and verifying written data
    #[arg(long)]
    pub no_data_check: bool,

    /// Set a tactic property after construction (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

impl TacticArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(size) = &self.io_size {
            config.tactic.io_size = size.clone();
        }
        if let Some(pattern) = &self.pattern {
            config.tactic.data_pattern = pattern.clone();
        }
        if let Some(seek) = &self.seek {
            config.tactic.seek_type = seek.clone();
        }
        if self.no_data_check {
            config.tactic.data_check = false;
        }
    }

    /// Config values overridden by the flags, then `--set` properties.
    pub fn build(&self, config: &Config) -> Result<IoTactic> {
        let mut config = config.clone();
        self.apply(&mut config);

        let pool_size = parse_size(&config.pattern.pool_size)
            .with_context(|| format!("Invalid pool size: {}", config.pattern.pool_size))?;
        let pool_size = usize::try_from(pool_size).context("Pool size does not fit in memory")?;
        let pool = Arc::new(RandomPool::new(pool_size).context("Failed to build random pool")?);

        let mut tactic = IoTactic::from_config(&config, pool).context("Invalid I/O tactic")?;
        for property in &self.properties {
            let (key, value) = property
                .split_once('=')
                .with_context(|| format!("Expected KEY=VALUE, got {}", property))?;
            tactic
                .set_property(key.trim(), value.trim())
                .with_context(|| format!("Failed to set {}", key))?;
        }

        for (key, value) in tactic.properties() {
            log_cli_debug!("Tactic property", key = key, value = display(&value));
        }
        Ok(tactic)
    }
}

pub fn print_report(action: &str, target: &std::path::Path, report: &IoReport) {
    println!(
        "{} {}: {} bytes in {} ops",
        action,
        target.display(),
        report.bytes,
        report.ops
    );
    if report.verified_units > 0 {
        println!("  ✅ {} units verified", report.verified_units);
    }
}
