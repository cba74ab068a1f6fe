//! Coordinate validation, normalization and repair.
//!
//! Coordinates reach this layer from GPS providers, the persistent store,
//! the delivery API and free-form user input, so every entry point accepts
//! an untyped [`serde_json::Value`]. Two shapes are recognised:
//!
//! - an ordered pair `[latitude, longitude]`
//! - an object `{ "latitude": .., "longitude": .. }`
//!
//! Everything that produces a coordinate for distance math or map rendering
//! funnels through [`get_safe_coords`], which never fails.
//!
//! # Example
//!
//! ```
//! use routekeeper::coord::{get_safe_coords, is_valid};
//! use serde_json::json;
//!
//! assert!(!is_valid(&json!([0, 0])));
//! assert!(is_valid(&json!({ "latitude": 18.4861, "longitude": -69.9312 })));
//!
//! let safe = get_safe_coords(&json!("18.47,-69.89"), None);
//! assert_eq!(safe.latitude, 18.47);
//! ```

mod repair;
mod types;


pub use repair::attempt_repair;
pub use types::{
    CoordError, Coordinate, DEFAULT_REGION_CENTER, EARTH_RADIUS_M, MAX_LAT, MAX_LON, MIN_LAT,
    MIN_LON,
};

use serde_json::Value;

/// True if `raw` is a well-formed, in-range, non-sentinel coordinate.
pub fn is_valid(raw: &Value) -> bool {
    normalize(raw).is_some()
}

/// Canonicalize either input shape into a [`Coordinate`].
///
/// Only JSON numbers are accepted; numeric strings are a repair concern.
/// Optional `accuracy` and `timestamp` fields on the object shape are kept.
pub fn normalize(raw: &Value) -> Option<Coordinate> {
    match raw {
        Value::Array(items) if items.len() == 2 => {
            let lat = items[0].as_f64()?;
            let lon = items[1].as_f64()?;
            Coordinate::new(lat, lon).ok()
        }
        Value::Object(map) => {
            let lat = map.get("latitude")?.as_f64()?;
            let lon = map.get("longitude")?.as_f64()?;
            let mut coord = Coordinate::new(lat, lon).ok()?;
            if let Some(accuracy) = map.get("accuracy").and_then(Value::as_f64) {
                coord = coord.with_accuracy(accuracy);
            }
            if let Some(ts) = map
                .get("timestamp")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
            {
                coord = coord.with_timestamp(ts);
            }
            Some(coord)
        }
        _ => None,
    }
}

/// `[longitude, latitude]` for systems expecting longitude-first ordering.
pub fn to_external_format(raw: &Value) -> Option<[f64; 2]> {
    normalize(raw).map(|c| c.to_external())
}

/// Keep only the entries that normalize, preserving order.
pub fn filter_valid(list: &[Value]) -> Vec<Coordinate> {
    list.iter().filter_map(normalize).collect()
}

/// Resolve `raw` to a usable coordinate, whatever it is.
///
/// Order: normalize, repair, `fallback` (if itself valid), then
/// [`DEFAULT_REGION_CENTER`].
pub fn get_safe_coords(raw: &Value, fallback: Option<&Coordinate>) -> Coordinate {
    if let Some(coord) = normalize(raw) {
        return coord;
    }
    if let Some(coord) = attempt_repair(raw) {
        tracing::debug!(
            latitude = coord.latitude,
            longitude = coord.longitude,
            "Repaired malformed coordinate"
        );
        return coord;
    }
    if let Some(fallback) = fallback.filter(|c| c.is_valid()) {
        tracing::warn!("Unusable coordinate, using caller fallback");
        return *fallback;
    }
    tracing::warn!("Unusable coordinate, using default region center");
    DEFAULT_REGION_CENTER
}

/// Haversine distance in metres; `None` if either side is invalid.
pub fn calculate_distance(a: &Value, b: &Value) -> Option<f64> {
    let a = normalize(a)?;
    let b = normalize(b)?;
    Some(a.distance_to(&b))
}

/// Whether `point` lies within `radius_m` metres of `center`.
pub fn is_within_radius(center: &Value, point: &Value, radius_m: f64) -> Option<bool> {
    calculate_distance(center, point).map(|d| d <= radius_m)
}
