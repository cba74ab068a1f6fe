//! Routekeeper CLI - Command-line interface
//!
//! Inspection tools for the routekeeper delivery tracking core: coordinate
//! checks, error classification, the delivery lifecycle and configuration.

mod commands;
mod error;

use clap::{Parser, Subcommand};

use commands::classify::ClassifyArgs;
use commands::config::ConfigCommands;
use commands::coords::CoordsCommands;
use error::CliError;

#[derive(Parser)]
#[command(name = "routekeeper")]
#[command(version = routekeeper::VERSION)]
#[command(about = "Inspect the routekeeper delivery tracking core", long_about = None)]
struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate, repair and measure coordinates
    Coords {
        #[command(subcommand)]
        command: CoordsCommands,
    },

    /// Show how a failure would be classified and recovered
    Classify(ClassifyArgs),

    /// Print the delivery status transition table
    Transitions,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    routekeeper::logging::init_cli_logging(cli.verbose);

    let result: Result<(), CliError> = match cli.command {
        Commands::Coords { command } => commands::coords::run(command),
        Commands::Classify(args) => commands::classify::run(args),
        Commands::Transitions => commands::transitions::run(),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
