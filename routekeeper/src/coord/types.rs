//! Coordinate type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Valid latitude range
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Mean Earth radius in metres, used for haversine distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Center of the default operating region (Santo Domingo).
///
/// Returned by [`super::get_safe_coords`] when nothing better is available.
pub const DEFAULT_REGION_CENTER: Coordinate = Coordinate {
    latitude: 18.4861,
    longitude: -69.9312,
    accuracy: None,
    timestamp: None,
};

/// A validated geographic position.
///
/// Construct through [`Coordinate::new`] or [`super::normalize`] so the
/// range and sentinel invariants hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in metres, when the source reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Coordinate {
    /// Create a coordinate, rejecting anything outside the valid domain.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordError> {
        check(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp: None,
        })
    }

    /// Attach a horizontal accuracy (metres).
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy.is_finite().then_some(accuracy);
        self
    }

    /// Attach the time the fix was taken.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Re-check the invariants (fields are public, so they can drift).
    pub fn validate(&self) -> Result<(), CoordError> {
        check(self.latitude, self.longitude)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Great-circle distance to `other` in metres (haversine).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    /// `[longitude, latitude]` ordering for GeoJSON-style consumers.
    pub fn to_external(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

fn check(latitude: f64, longitude: f64) -> Result<(), CoordError> {
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(CoordError::NonFinite);
    }
    if !(MIN_LAT..=MAX_LAT).contains(&latitude) {
        return Err(CoordError::LatitudeOutOfRange(latitude));
    }
    if !(MIN_LON..=MAX_LON).contains(&longitude) {
        return Err(CoordError::LongitudeOutOfRange(longitude));
    }
    if latitude == 0.0 && longitude == 0.0 {
        return Err(CoordError::NullIsland);
    }
    Ok(())
}

/// Reasons a coordinate is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("coordinate contains a non-finite value")]
    NonFinite,

    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    /// (0, 0) is what a broken GPS stack reports, not a delivery address.
    #[error("coordinate (0, 0) is a sentinel value")]
    NullIsland,

    #[error("value is not a coordinate")]
    NotACoordinate,
}
