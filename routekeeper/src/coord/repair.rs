//! Best-effort recovery of malformed coordinates.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::{normalize, Coordinate};

/// Alternate (latitude, longitude) field names seen in the wild.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("latitude", "longitude"),
    ("lat", "lng"),
    ("lat", "lon"),
    ("lat", "long"),
    ("Latitude", "Longitude"),
    ("Lat", "Lng"),
    ("y", "x"),
];

/// Wrapper objects that sometimes carry the actual coordinate.
const NESTED_KEYS: &[&str] = &["coords", "coordinates", "location", "position"];

/// JSON strings may themselves contain JSON; don't chase that forever.
const MAX_DEPTH: usize = 3;

fn pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(-?\d+(?:\.\d+)?)\s*[,;\s]\s*(-?\d+(?:\.\d+)?)")
            .expect("coordinate pair pattern is valid")
    })
}

/// Try to recover a valid coordinate from `raw`.
///
/// Handles JSON-encoded strings, `"lat,lng"` pairs embedded in free text,
/// alternate field names, numeric strings, and one level of wrapping
/// (`{"location": {...}}`). The candidate is re-validated before it is
/// returned; `None` means the value is irreparable.
pub fn attempt_repair(raw: &Value) -> Option<Coordinate> {
    repair_at(raw, 0)
}

fn repair_at(raw: &Value, depth: usize) -> Option<Coordinate> {
    if depth > MAX_DEPTH {
        return None;
    }
    if let Some(coord) = normalize(raw) {
        return Some(coord);
    }

    match raw {
        Value::String(text) => repair_text(text, depth),
        Value::Array(items) if items.len() == 2 => {
            candidate(numeric(&items[0])?, numeric(&items[1])?)
        }
        Value::Object(map) => repair_object(map, depth),
        _ => None,
    }
}

fn repair_text(text: &str, depth: usize) -> Option<Coordinate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        // A bare number parses as JSON but is never a coordinate.
        if !parsed.is_number() {
            if let Some(coord) = repair_at(&parsed, depth + 1) {
                return Some(coord);
            }
        }
    }

    pair_pattern().captures_iter(trimmed).find_map(|caps| {
        let lat = caps.get(1)?.as_str().parse().ok()?;
        let lon = caps.get(2)?.as_str().parse().ok()?;
        candidate(lat, lon)
    })
}

fn repair_object(map: &Map<String, Value>, depth: usize) -> Option<Coordinate> {
    let aliased = FIELD_ALIASES.iter().find_map(|(lat_key, lon_key)| {
        let lat = numeric(map.get(*lat_key)?)?;
        let lon = numeric(map.get(*lon_key)?)?;
        candidate(lat, lon)
    });
    if aliased.is_some() {
        return aliased;
    }

    NESTED_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(|nested| repair_at(nested, depth + 1))
}

/// Numbers, or strings that parse as numbers.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn candidate(lat: f64, lon: f64) -> Option<Coordinate> {
    Coordinate::new(lat, lon).ok()
}
