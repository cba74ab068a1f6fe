//! Service wiring for routekeeper.
//!
//! [`TrackingServices`] builds every tracking component from a
//! [`crate::config::ConfigFile`] and the platform collaborators, shares one
//! store, connectivity observer and presenter between them, and owns the
//! background listeners:
//!
//! - the offline queue syncs when connectivity returns
//! - the delivery state machine applies real-time server events
//! - sync failures go to the recovery engine, and refused replays refresh
//!   the active delivery
//! - recovery viewport resets reach the viewport controller
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use routekeeper::config::ConfigFile;
//! use routekeeper::service::TrackingServices;
//!
//! let services = TrackingServices::builder(ConfigFile::load()?)
//!     .location_provider(Arc::new(platform_provider))
//!     .store(Arc::new(platform_store))
//!     .build()
//!     .await?;
//!
//! let fix = services.location().get_location_with_fallback().await?;
//! ```

mod builder;
mod error;
mod facade;
mod listeners;

pub use builder::{
    create_delivery_api, create_location_service, create_offline_queue, create_recovery_engine,
    create_state_machine, load_with_repair, register_sync_handlers,
};
pub use error::ServiceError;
pub use facade::{TrackingServices, TrackingServicesBuilder};
pub use listeners::{spawn_recovery_listener, spawn_sync_listener};
