//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init`. Every command
//! takes `--file` to work on a config file other than
//! `~/.routekeeper/config.ini`.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use routekeeper::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path {
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print the effective configuration (defaults if no file exists)
    Show {
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Write a configuration file with default values
    Init {
        #[arg(long)]
        file: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path { file } => run_path(&resolve(file)),
        ConfigCommands::Show { file } => run_show(&resolve(file)),
        ConfigCommands::Init { file, force } => run_init(&resolve(file), force),
    }
}

fn resolve(file: Option<PathBuf>) -> PathBuf {
    file.unwrap_or_else(config_file_path)
}

fn run_path(path: &Path) -> Result<(), CliError> {
    println!("{}", path.display());
    Ok(())
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = ConfigFile::load_from(path)?;
    if !path.exists() {
        println!("; {} not found, showing defaults", path.display());
    }
    print!("{}", config.to_ini_string());
    Ok(())
}

fn run_init(path: &Path, force: bool) -> Result<(), CliError> {
    if force {
        ConfigFile::default().save_to(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    if ConfigFile::ensure_exists_at(path)? {
        println!("Created {}", path.display());
    } else {
        println!("{} already exists (use --force to overwrite)", path.display());
    }
    Ok(())
}
