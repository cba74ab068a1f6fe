//! Location Service
//!
//! Acquires device location through a platform [`LocationProvider`],
//! validates every fix with [`crate::coord`], and persists accepted samples
//! as the last known location plus a bounded history.
//!
//! # Tracking
//!
//! Continuous tracking shares a single upstream platform watch between all
//! consumers. Each call to [`LocationService::start_tracking`] registers a
//! callback and restarts the watch with the new options; the watch stops
//! when the last subscriber leaves or [`LocationService::stop_tracking`]
//! is called.
//!
//! ```text
//! provider watch ──► validate ──► persist ──► registry ──► callback 1
//!                       │                                 └► callback 2
//!                       └─ invalid: dropped with a warning
//! ```
//!
//! # Fallback
//!
//! [`LocationService::get_location_with_fallback`] resolves, in order:
//! live fixes with shrinking timeouts, a last known sample younger than six
//! hours, then the configured default location.

mod error;
mod provider;
mod registry;
mod sample;
mod service;

pub use error::LocationError;
pub use provider::{
    FixStream, LocationProvider, PermissionStatus, PositionOptions, ProviderError, RawFix,
    DEFAULT_DISTANCE_FILTER_M, DEFAULT_FIX_TIMEOUT, DEFAULT_MAXIMUM_AGE,
};
pub use registry::{LocationCallback, SubscriberId, SubscriberRegistry};
pub use sample::LocationSample;
pub use service::{
    LocationService, LocationServiceConfig, LocationSource, ResolvedLocation, TrackingState,
    DEFAULT_FALLBACK_TIMEOUTS, DEFAULT_HISTORY_CAPACITY, DEFAULT_MAX_LAST_KNOWN_AGE,
    DEFAULT_TIMEOUT_MARGIN,
};
