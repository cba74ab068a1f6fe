//! Platform location provider contract.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Default single-fix timeout.
pub const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(15);

/// Default maximum age of a cached platform fix.
pub const DEFAULT_MAXIMUM_AGE: Duration = Duration::from_secs(10);

/// Default minimum movement before the platform reports a new fix.
pub const DEFAULT_DISTANCE_FILTER_M: f64 = 10.0;

/// Options passed through to the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Accept a cached platform fix no older than this.
    pub maximum_age: Duration,
    /// Watch only: metres of movement between reports.
    pub distance_filter_m: f64,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: DEFAULT_FIX_TIMEOUT,
            maximum_age: DEFAULT_MAXIMUM_AGE,
            distance_filter_m: DEFAULT_DISTANCE_FILTER_M,
        }
    }
}

impl PositionOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An unvalidated fix as reported by the platform.
///
/// Nothing here is trusted; the location service validates every fix
/// before it is persisted or forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    /// Metres per second.
    pub speed: Option<f64>,
    /// Degrees clockwise from true north.
    pub heading: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            speed: None,
            heading: None,
            timestamp: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Failures reported by the platform provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("platform timed out waiting for a fix")]
    Timeout,

    #[error("location provider error: {0}")]
    Other(String),
}

/// Stream of fixes from a continuous watch.
pub type FixStream = mpsc::Receiver<Result<RawFix, ProviderError>>;

/// The device's location hardware and permission system.
pub trait LocationProvider: Send + Sync {
    fn request_permission(&self) -> BoxFuture<'_, PermissionStatus>;

    /// A single fix.
    fn current_position(
        &self,
        options: PositionOptions,
    ) -> BoxFuture<'_, Result<RawFix, ProviderError>>;

    /// Start a continuous watch.
    ///
    /// The platform keeps reporting into the returned stream until the
    /// receiver is dropped.
    fn watch_position(&self, options: PositionOptions) -> Result<FixStream, ProviderError>;
}
