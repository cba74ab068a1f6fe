//! Accepted location samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::RawFix;
use crate::coord::{CoordError, Coordinate};

/// A validated fix, as persisted and forwarded to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    pub saved_at: DateTime<Utc>,
}

impl LocationSample {
    /// Validate a platform fix.
    ///
    /// Non-finite auxiliary readings (accuracy, speed, heading) are dropped
    /// rather than failing the whole sample.
    pub fn from_fix(fix: &RawFix) -> Result<Self, CoordError> {
        let now = Utc::now();
        let mut coordinate = Coordinate::new(fix.latitude, fix.longitude)?
            .with_timestamp(fix.timestamp.unwrap_or(now));
        coordinate.accuracy = finite(fix.accuracy);

        Ok(Self {
            coordinate,
            speed: finite(fix.speed),
            heading: finite(fix.heading),
            saved_at: now,
        })
    }

    /// A synthetic sample for a known coordinate (fallbacks, defaults).
    pub fn from_coordinate(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            speed: None,
            heading: None,
            saved_at: Utc::now(),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.coordinate.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.coordinate.longitude
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
