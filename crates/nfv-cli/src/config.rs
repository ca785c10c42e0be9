//! `nfv config` subcommands.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use nfv_config::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Print the config files that are consulted
    Path,

    /// Write a default config file
    Init {
        /// Write ~/.nfv/config.toml instead of .nfv/config.toml
        #[arg(long)]
        global: bool,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(config: &Config, explicit: Option<&Path>, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let rendered =
                toml::to_string_pretty(config).context("Failed to serialize configuration")?;
            print!("{}", rendered);
        }
        ConfigCommands::Path => {
            if let Some(path) = explicit {
                println!("Explicit: {}", path.display());
                return Ok(());
            }
            match Config::global_config_path() {
                Some(path) => println!("Global:  {}{}", path.display(), presence(&path)),
                None => println!("Global:  (no home directory)"),
            }
            let project = Config::project_config_path();
            println!("Project: {}{}", project.display(), presence(&project));
        }
        ConfigCommands::Init { global, force } => {
            let path = init_target(global)?;
            write_default(&path, force)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn presence(path: &Path) -> &'static str {
    if path.exists() {
        ""
    } else {
        " (not found)"
    }
}

fn init_target(global: bool) -> Result<PathBuf> {
    if global {
        Config::global_config_path().context("Cannot determine home directory")
    } else {
        Ok(Config::project_config_path())
    }
}

fn write_default(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to replace it)", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))
}
