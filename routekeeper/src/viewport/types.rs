//! Viewport values and change events.

use serde::{Deserialize, Serialize};

use crate::coord::{Coordinate, DEFAULT_REGION_CENTER};

/// Span of the simplified default viewport, in degrees.
pub const DEFAULT_LATITUDE_SPAN: f64 = 0.0922;
pub const DEFAULT_LONGITUDE_SPAN: f64 = 0.0421;

/// Visible map region: a center and the degrees it spans.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub latitude_span: f64,
    pub longitude_span: f64,
}

impl Viewport {
    pub fn new(
        center_latitude: f64,
        center_longitude: f64,
        latitude_span: f64,
        longitude_span: f64,
    ) -> Self {
        Self {
            center_latitude,
            center_longitude,
            latitude_span,
            longitude_span,
        }
    }

    pub fn centered_on(center: &Coordinate, latitude_span: f64, longitude_span: f64) -> Self {
        Self::new(
            center.latitude,
            center.longitude,
            latitude_span,
            longitude_span,
        )
    }

    /// Fallback region shown after map failures.
    pub fn simplified_default() -> Self {
        Self::centered_on(
            &DEFAULT_REGION_CENTER,
            DEFAULT_LATITUDE_SPAN,
            DEFAULT_LONGITUDE_SPAN,
        )
    }

    pub fn center(&self) -> Option<Coordinate> {
        Coordinate::new(self.center_latitude, self.center_longitude).ok()
    }

    /// Valid center and finite, positive spans.
    pub fn is_valid(&self) -> bool {
        self.center().is_some()
            && self.latitude_span.is_finite()
            && self.longitude_span.is_finite()
            && self.latitude_span > 0.0
            && self.longitude_span > 0.0
    }

    /// True if the center moved more than `center_threshold` degrees or
    /// either span changed by more than `span_threshold` degrees.
    pub fn differs_from(&self, other: &Viewport, center_threshold: f64, span_threshold: f64) -> bool {
        (self.center_latitude - other.center_latitude).abs() > center_threshold
            || (self.center_longitude - other.center_longitude).abs() > center_threshold
            || (self.latitude_span - other.latitude_span).abs() > span_threshold
            || (self.longitude_span - other.longitude_span).abs() > span_threshold
    }
}

/// What caused a viewport change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    UserGesture,
    /// Recentering or animation started by the app itself.
    Programmatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportChange {
    pub viewport: Viewport,
    pub origin: ChangeOrigin,
}

impl ViewportChange {
    pub fn gesture(viewport: Viewport) -> Self {
        Self {
            viewport,
            origin: ChangeOrigin::UserGesture,
        }
    }

    pub fn programmatic(viewport: Viewport) -> Self {
        Self {
            viewport,
            origin: ChangeOrigin::Programmatic,
        }
    }
}
