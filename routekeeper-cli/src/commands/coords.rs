//! Coordinate CLI commands.
//!
//! Inputs are parsed as JSON when possible (`[18.48,-69.93]`,
//! `{"latitude":18.48,"longitude":-69.93}`); anything else is treated as a
//! raw string, which only `repair` can make sense of.

use clap::Subcommand;
use routekeeper::coord::{self, Coordinate};
use serde_json::Value;

use crate::error::CliError;

/// Coords subcommands.
#[derive(Debug, Subcommand)]
pub enum CoordsCommands {
    /// Check that a coordinate is well formed and in range
    Validate {
        /// Coordinate as JSON pair or object
        input: String,
    },

    /// Recover a coordinate from malformed input
    Repair {
        /// Coordinate in any shape, e.g. "18.47,-69.89"
        input: String,
    },

    /// Great-circle distance between two coordinates in metres
    Distance {
        /// First coordinate
        a: String,
        /// Second coordinate
        b: String,
    },

    /// Check whether a point lies within a radius of a center
    Within {
        /// Center coordinate
        center: String,
        /// Point to test
        point: String,
        /// Radius in metres
        radius_m: f64,
    },
}

/// Run a coords subcommand.
pub fn run(command: CoordsCommands) -> Result<(), CliError> {
    match command {
        CoordsCommands::Validate { input } => run_validate(&input),
        CoordsCommands::Repair { input } => run_repair(&input),
        CoordsCommands::Distance { a, b } => run_distance(&a, &b),
        CoordsCommands::Within {
            center,
            point,
            radius_m,
        } => run_within(&center, &point, radius_m),
    }
}

/// JSON if it parses, otherwise the raw text as a JSON string.
pub fn parse_input(input: &str) -> Value {
    serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string()))
}

fn format_coordinate(c: &Coordinate) -> String {
    format!("{:.6},{:.6}", c.latitude, c.longitude)
}

fn require_valid(input: &str) -> Result<Value, CliError> {
    let value = parse_input(input);
    if coord::is_valid(&value) {
        Ok(value)
    } else {
        Err(CliError::InvalidCoordinate(input.to_string()))
    }
}

fn run_validate(input: &str) -> Result<(), CliError> {
    let value = parse_input(input);
    match coord::normalize(&value) {
        Some(c) => {
            println!("valid: {}", format_coordinate(&c));
            Ok(())
        }
        None => Err(CliError::CheckFailed(format!("invalid coordinate: {}", input))),
    }
}

fn run_repair(input: &str) -> Result<(), CliError> {
    let value = parse_input(input);
    if let Some(c) = coord::normalize(&value) {
        println!("{} (already valid)", format_coordinate(&c));
        return Ok(());
    }
    match coord::attempt_repair(&value) {
        Some(c) => {
            println!("{} (repaired)", format_coordinate(&c));
            Ok(())
        }
        None => Err(CliError::InvalidCoordinate(input.to_string())),
    }
}

fn run_distance(a: &str, b: &str) -> Result<(), CliError> {
    let a = require_valid(a)?;
    let b = require_valid(b)?;
    let distance = coord::calculate_distance(&a, &b)
        .ok_or_else(|| CliError::InvalidArgument("distance undefined".to_string()))?;
    println!("{:.1} m", distance);
    Ok(())
}

fn run_within(center: &str, point: &str, radius_m: f64) -> Result<(), CliError> {
    if !radius_m.is_finite() || radius_m < 0.0 {
        return Err(CliError::InvalidArgument(format!(
            "radius must be a non-negative number of metres, got {}",
            radius_m
        )));
    }
    let center = require_valid(center)?;
    let point = require_valid(point)?;
    let within = coord::is_within_radius(&center, &point, radius_m).unwrap_or(false);
    println!("{}", within);
    if within {
        Ok(())
    } else {
        Err(CliError::CheckFailed(format!(
            "point is outside {} m",
            radius_m
        )))
    }
}
