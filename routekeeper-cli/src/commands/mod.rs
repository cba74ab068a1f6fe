//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`classify`] - Error classification and recovery budget
//! - [`config`] - Configuration management (path, show, init)
//! - [`coords`] - Coordinate validation, repair and distance
//! - [`transitions`] - Delivery status lifecycle

pub mod classify;
pub mod config;
pub mod coords;
pub mod transitions;
