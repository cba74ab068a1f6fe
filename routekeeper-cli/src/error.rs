//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use routekeeper::config::ConfigFileError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Input could not be read as a coordinate
    InvalidCoordinate(String),
    /// Input is well formed but fails the check that was asked for
    CheckFailed(String),
    /// Bad command-line argument
    InvalidArgument(String),
    /// Configuration error
    Config(ConfigFileError),
}

impl CliError {
    /// Exit code for this error: 1 for a failed check, 2 for bad input.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::CheckFailed(_) => 1,
            _ => 2,
        }
    }

    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::InvalidCoordinate(_) => {
                eprintln!();
                eprintln!("Coordinates are accepted as:");
                eprintln!("  [latitude, longitude]");
                eprintln!("  {{\"latitude\": .., \"longitude\": ..}}");
                eprintln!("  \"latitude,longitude\" (repair only)");
            }
            CliError::Config(ConfigFileError::InvalidValue { section, .. }) => {
                eprintln!();
                eprintln!(
                    "Fix the [{}] section or run 'routekeeper config init --force' to start over.",
                    section
                );
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidCoordinate(input) => write!(f, "Not a usable coordinate: {}", input),
            CliError::CheckFailed(msg) => write!(f, "{}", msg),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}
