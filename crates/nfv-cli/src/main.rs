//! # nfv CLI
//!
//! Command-line interface for the nfv NAS workload generator.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nfv_config::logging::{init_logging, LogLevel};
use nfv_config::{log_cli_debug, Config};

mod block;
mod config;
mod file;
mod lock;
mod tactic;

/// nfv - synthetic file, block device and byte-range lock workloads
#[derive(Parser)]
#[command(name = "nfv")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Use this config file instead of ~/.nfv/config.toml and .nfv/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create (or truncate) a file and fill it with the I/O tactic
    Create(file::CreateArgs),

    /// Rewrite an existing file in place
    Overwrite(file::OverwriteArgs),

    /// Read a file following the I/O tactic's seek order
    Read(file::ReadArgs),

    /// BLAKE3 checksum of a file, or of every file under a directory
    Checksum(file::ChecksumArgs),

    /// Resize a file
    Truncate(file::TruncateArgs),

    /// Write (or read) a range of a block device
    Block(block::BlockArgs),

    /// Lay out byte-range locks over a file, hold them, then release them
    Lock(lock::LockArgs),

    /// Inspect or create configuration
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            config.apply_env_overrides();
            Ok(config)
        }
        None => Config::load().context("Failed to load configuration"),
    }
}

fn main() -> Result<()> {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let level = config
        .logging
        .level
        .parse::<LogLevel>()
        .unwrap_or(LogLevel::Warn)
        .raised(cli.verbose);
    init_logging(level);
    log_cli_debug!("Configuration loaded", level = level.as_str());

    match cli.command {
        Commands::Create(args) => file::create(&config, args),
        Commands::Overwrite(args) => file::overwrite(&config, args),
        Commands::Read(args) => file::read(&config, args),
        Commands::Checksum(args) => file::checksum(args),
        Commands::Truncate(args) => file::truncate(args),
        Commands::Block(args) => block::run(&config, args),
        Commands::Lock(args) => lock::run(&config, args),
        Commands::Config { command } => config::run(&config, cli.config.as_deref(), command),
    }
}
