//! Byte-range lock workloads.
//!
//! Each strategy of the plan runs in turn: deploy its regions, switch them
//! on, hold them, then check and release them.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use nfv_config::{log_cli_info, Config};
use nfv_lock::{retry, LockManager, LockMode, LockPlan, RetryPolicy};
use tracing::field::display;

#[derive(Args, Debug)]
pub struct LockArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// start:length:step:stop:duration, several joined with '+'
    #[arg(long, value_name = "STRATEGY")]
    strategy: Option<String>,

    /// exclusive, exclusive_blk, exclusive_io, exclusive_blk_io or shared
    #[arg(long, value_name = "MODE")]
    mode: Option<String>,

    /// Data written by the _io modes, or expected by shared locks
    #[arg(long, value_name = "TEXT")]
    data: Option<String>,

    /// Hold time in seconds, overriding each strategy's duration
    #[arg(long, value_name = "SECS")]
    hold: Option<u64>,

    /// Attempts after a lock conflict or a full lock table
    #[arg(long, value_name = "N")]
    retries: Option<u32>,
}

pub fn run(config: &Config, args: LockArgs) -> Result<()> {
    let strategy = args.strategy.as_deref().unwrap_or(&config.lock.strategy);
    let plan: LockPlan = strategy
        .parse()
        .with_context(|| format!("Invalid lock strategy: {}", strategy))?;
    let mode_name = args.mode.as_deref().unwrap_or(&config.lock.mode);
    let mode: LockMode = mode_name
        .parse()
        .with_context(|| format!("Invalid lock mode: {}", mode_name))?;

    let mut policy = RetryPolicy::from_config(&config.lock);
    if let Some(retries) = args.retries {
        policy.max_retries = retries;
    }
    let data = args.data.map(String::into_bytes);

    for strategy in &plan {
        let mut manager = LockManager::new()?;
        manager
            .attach(&args.path)
            .with_context(|| format!("Failed to open {}", args.path.display()))?;
        let deployed = manager.deploy(strategy, mode, data.as_deref())?;

        let mut held = 0;
        for lock in manager.iter_mut() {
            match retry(&policy, || lock.on()) {
                Ok(()) => held += 1,
                // Another owner still holds it after all retries
                Err(err) if err.is_retryable() => {
                    eprintln!("  ⚠️  {} unavailable: {}", lock.region(), err);
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed to lock {}", lock.region()));
                }
            }
        }
        println!(
            "Holding {}/{} {} locks on {} ({})",
            held,
            deployed,
            mode,
            args.path.display(),
            strategy
        );

        let hold = args.hold.map(Duration::from_secs).unwrap_or(strategy.duration);
        if !hold.is_zero() {
            log_cli_info!("Holding locks", seconds = hold.as_secs(), strategy = display(strategy));
            thread::sleep(hold);
        }

        manager
            .switch_off_all()
            .context("Failed to check and release locks")?;
        manager.wipe()?;
        println!("  ✅ Released {} locks", held);
    }
    Ok(())
}
