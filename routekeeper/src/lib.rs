//! Routekeeper - resilient delivery tracking on unreliable mobile networks
//!
//! This library is the client-side core of a delivery-tracking app: it
//! keeps a courier's location, delivery status and map view consistent
//! while GPS fixes drop out, the network comes and goes, and persisted
//! data goes stale or corrupt.
//!
//! # Components
//!
//! - [`coord`] validates and repairs coordinates from any source
//! - [`location`] resolves device location with layered fallbacks
//! - [`offline`] queues actions while offline and replays them on reconnect
//! - [`recovery`] classifies failures and runs bounded recovery strategies
//! - [`delivery`] owns the delivery status lifecycle and server sync
//! - [`viewport`] debounces map region changes and breaks feedback loops
//!
//! # High-Level API
//!
//! The [`service`] module wires everything from a [`config::ConfigFile`]:
//!
//! ```ignore
//! use routekeeper::config::ConfigFile;
//! use routekeeper::service::TrackingServices;
//!
//! let services = TrackingServices::builder(ConfigFile::load()?)
//!     .location_provider(platform_provider)
//!     .build()
//!     .await?;
//!
//! services.delivery().advance(None, None).await?;
//! ```

pub mod busy;
pub mod config;
pub mod connectivity;
pub mod coord;
pub mod delivery;
pub mod history;
pub mod location;
pub mod logging;
pub mod notify;
pub mod offline;
pub mod recovery;
pub mod retry;
pub mod service;
pub mod store;
pub mod time;
pub mod viewport;

/// Version of the routekeeper library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
