//! Block device workloads.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use nfv_config::{format_size, log_cli_info, parse_size, Config};
use nfv_io::{BlockDevice, IntegrityStore};
use tracing::field::display;

use crate::tactic::{print_report, TacticArgs};

#[derive(Args, Debug)]
pub struct BlockArgs {
    /// Block device (or any fixed-size file)
    #[arg(value_name = "DEVICE")]
    device: PathBuf,

    /// First byte of the range
    #[arg(long, value_name = "SIZE", default_value = "0")]
    start: String,

    /// End of the range, exclusive. Defaults to the device size.
    #[arg(long, value_name = "SIZE")]
    stop: Option<String>,

    /// Bypass the page cache (O_DIRECT, Linux only)
    #[arg(long)]
    direct: bool,

    /// Read the range instead of writing it
    #[arg(long)]
    read: bool,

    #[command(flatten)]
    tactic: TacticArgs,
}

pub fn run(config: &Config, args: BlockArgs) -> Result<()> {
    let device = BlockDevice::open(&args.device)
        .with_context(|| format!("Failed to open device {}", args.device.display()))?
        .with_direct_io(args.direct);

    let start = parse_size(&args.start).with_context(|| format!("Invalid start: {}", args.start))?;
    let stop = match &args.stop {
        Some(raw) => parse_size(raw).with_context(|| format!("Invalid stop: {}", raw))?,
        None => device.size(),
    };
    log_cli_info!(
        "Block device opened",
        device = display(args.device.display()),
        size = display(format_size(device.size())),
        direct = device.is_direct(),
    );

    let mut tactic = args.tactic.build(config)?;
    let report = if args.read {
        device.read(&tactic, start, stop)
    } else {
        let mut store = IntegrityStore::new();
        device.write(&mut tactic, &mut store, start, stop)
    }
    .with_context(|| format!("Block I/O on {} failed", args.device.display()))?;

    let action = if args.read { "Read" } else { "Wrote" };
    print_report(action, device.path(), &report);
    Ok(())
}
