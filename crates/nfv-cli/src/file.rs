//! File workload commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use nfv_config::{format_size, log_cli_info, parse_size, Config};
use nfv_io::{IntegrityStore, IoFile};
use tracing::field::display;
use walkdir::WalkDir;

use crate::tactic::{print_report, TacticArgs};

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// File size ("10k", "1g", ...)
    #[arg(long, value_name = "SIZE")]
    size: String,

    /// Leave an existing file untouched instead of truncating it
    #[arg(long)]
    keep: bool,

    #[command(flatten)]
    tactic: TacticArgs,
}

#[derive(Args, Debug)]
pub struct OverwriteArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,

    #[command(flatten)]
    tactic: TacticArgs,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,

    #[command(flatten)]
    tactic: TacticArgs,
}

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// File, or directory to walk
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

#[derive(Args, Debug)]
pub struct TruncateArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// New size ("0", "4k", ...)
    #[arg(long, value_name = "SIZE")]
    size: String,
}

fn size_arg(raw: &str) -> Result<u64> {
    parse_size(raw).with_context(|| format!("Invalid size: {}", raw))
}

pub fn create(config: &Config, args: CreateArgs) -> Result<()> {
    let size = size_arg(&args.size)?;
    let mut tactic = args.tactic.build(config)?;
    let mut store = IntegrityStore::new();

    let file = if args.keep {
        IoFile::open_or_create(&args.path, size, &mut tactic, &mut store)
    } else {
        IoFile::create(&args.path, size, &mut tactic, &mut store)
    }
    .with_context(|| format!("Failed to create {}", args.path.display()))?;

    log_cli_info!(
        "File ready",
        path = display(file.path().display()),
        size = file.size(),
        data_check = tactic.data_check(),
    );
    println!("Created {} ({})", file.path().display(), format_size(file.size()));
    Ok(())
}

pub fn overwrite(config: &Config, args: OverwriteArgs) -> Result<()> {
    let mut tactic = args.tactic.build(config)?;
    let mut store = IntegrityStore::new();
    let mut file = IoFile::load(&args.path)
        .with_context(|| format!("Failed to open {}", args.path.display()))?;
    let report = file
        .overwrite(&mut tactic, &mut store)
        .with_context(|| format!("Failed to overwrite {}", args.path.display()))?;
    print_report("Overwrote", file.path(), &report);
    Ok(())
}

pub fn read(config: &Config, args: ReadArgs) -> Result<()> {
    let tactic = args.tactic.build(config)?;
    let file = IoFile::load(&args.path)
        .with_context(|| format!("Failed to open {}", args.path.display()))?;
    let report = file
        .read(&tactic)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    print_report("Read", file.path(), &report);
    Ok(())
}

pub fn checksum(args: ChecksumArgs) -> Result<()> {
    for path in checksum_targets(&args.path)? {
        let mut file =
            IoFile::load(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        let sum = file
            .checksum()
            .with_context(|| format!("Failed to checksum {}", path.display()))?;
        println!("{}  {}", sum, path.display());
    }
    Ok(())
}

/// `root` itself, or every regular file under it in name order.
fn checksum_targets(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

pub fn truncate(args: TruncateArgs) -> Result<()> {
    let size = size_arg(&args.size)?;
    let mut file = IoFile::load(&args.path)
        .with_context(|| format!("Failed to open {}", args.path.display()))?;
    file.truncate(size)
        .with_context(|| format!("Failed to truncate {}", args.path.display()))?;
    println!("Truncated {} to {}", file.path().display(), format_size(file.size()));
    Ok(())
}
