//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::coord::Coordinate;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [location] section
    if let Some(section) = ini.section(Some("location")) {
        let s = "location";
        if let Some(v) = section.get("timeout_margin_ms") {
            config.location.timeout_margin_ms = number(s, "timeout_margin_ms", v)?;
        }
        if let Some(v) = section.get("fallback_timeouts_secs") {
            config.location.fallback_timeouts_secs = parse_secs_list(v).ok_or_else(|| {
                invalid(
                    s,
                    "fallback_timeouts_secs",
                    v,
                    "expected comma-separated positive seconds, e.g. '15,10,5'",
                )
            })?;
        }
        if let Some(v) = section.get("max_last_known_age_secs") {
            config.location.max_last_known_age_secs = number(s, "max_last_known_age_secs", v)?;
        }
        if let Some(v) = section.get("default_location") {
            config.location.default_location = parse_location(v).map_err(|reason| {
                invalid(s, "default_location", v, &reason)
            })?;
        }
        if let Some(v) = section.get("history_capacity") {
            config.location.history_capacity = positive(s, "history_capacity", v)?;
        }
        if let Some(v) = section.get("high_accuracy") {
            config.location.high_accuracy = parse_bool(v);
        }
        if let Some(v) = section.get("fix_timeout_secs") {
            config.location.fix_timeout_secs = positive(s, "fix_timeout_secs", v)?;
        }
        if let Some(v) = section.get("distance_filter_m") {
            let parsed: f64 = number(s, "distance_filter_m", v)?;
            if !parsed.is_finite() || parsed < 0.0 {
                return Err(invalid(s, "distance_filter_m", v, "must be zero or more metres"));
            }
            config.location.distance_filter_m = parsed;
        }
    }

    // [offline] section
    if let Some(section) = ini.section(Some("offline")) {
        let s = "offline";
        if let Some(v) = section.get("max_retries") {
            config.offline.max_retries = positive(s, "max_retries", v)?;
        }
        if let Some(v) = section.get("status_history_capacity") {
            config.offline.status_history_capacity = positive(s, "status_history_capacity", v)?;
        }
        if let Some(v) = section.get("location_history_capacity") {
            config.offline.location_history_capacity =
                positive(s, "location_history_capacity", v)?;
        }
        if let Some(v) = section.get("delivery_data_max_age_hours") {
            config.offline.delivery_data_max_age_hours =
                positive(s, "delivery_data_max_age_hours", v)?;
        }
    }

    // [recovery] section
    if let Some(section) = ini.section(Some("recovery")) {
        let s = "recovery";
        if let Some(v) = section.get("rate_limit_wait_secs") {
            config.recovery.rate_limit_wait_secs = number(s, "rate_limit_wait_secs", v)?;
        }
        if let Some(v) = section.get("history_capacity") {
            config.recovery.history_capacity = positive(s, "history_capacity", v)?;
        }
    }

    // [delivery] section
    if let Some(section) = ini.section(Some("delivery")) {
        let s = "delivery";
        if let Some(v) = section.get("api_base_url") {
            config.delivery.api_base_url = parse_url(v).map_err(|reason| {
                invalid(s, "api_base_url", v, reason)
            })?;
        }
        if let Some(v) = section.get("request_timeout_secs") {
            config.delivery.request_timeout_secs = positive(s, "request_timeout_secs", v)?;
        }
        if let Some(v) = section.get("confirm_attempts") {
            config.delivery.confirm_attempts = positive(s, "confirm_attempts", v)?;
        }
        if let Some(v) = section.get("confirm_backoff_ms") {
            config.delivery.confirm_backoff_ms = number(s, "confirm_backoff_ms", v)?;
        }
    }

    // [viewport] section
    if let Some(section) = ini.section(Some("viewport")) {
        let s = "viewport";
        if let Some(v) = section.get("debounce_ms") {
            config.viewport.debounce_ms = number(s, "debounce_ms", v)?;
        }
        if let Some(v) = section.get("center_threshold_deg") {
            config.viewport.center_threshold_deg = degrees(s, "center_threshold_deg", v)?;
        }
        if let Some(v) = section.get("span_threshold_deg") {
            config.viewport.span_threshold_deg = degrees(s, "span_threshold_deg", v)?;
        }
        if let Some(v) = section.get("loop_window_ms") {
            config.viewport.loop_window_ms = positive(s, "loop_window_ms", v)?;
        }
        if let Some(v) = section.get("loop_ceiling") {
            config.viewport.loop_ceiling = positive(s, "loop_ceiling", v)?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        apply_logging(section, &mut config);
    }

    Ok(config)
}

fn apply_logging(section: &Properties, config: &mut ConfigFile) {
    if let Some(v) = section.get("directory") {
        let v = v.trim();
        if !v.is_empty() {
            config.logging.directory = expand_tilde(v);
        }
    }
    if let Some(v) = section.get("file") {
        let v = v.trim();
        if !v.is_empty() {
            config.logging.file = v.to_string();
        }
    }
    if let Some(v) = section.get("level") {
        let v = v.trim();
        if !v.is_empty() {
            config.logging.level = v.to_lowercase();
        }
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a number"))
}

fn positive<T>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError>
where
    T: FromStr + PartialOrd + Default,
{
    let parsed: T = value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a positive integer"))?;
    if parsed <= T::default() {
        return Err(invalid(section, key, value, "must be a positive integer"));
    }
    Ok(parsed)
}

fn degrees(section: &str, key: &str, value: &str) -> Result<f64, ConfigFileError> {
    let parsed: f64 = number(section, key, value)?;
    if !parsed.is_finite() || parsed < 0.0 || parsed > 180.0 {
        return Err(invalid(section, key, value, "must be between 0 and 180 degrees"));
    }
    Ok(parsed)
}

fn parse_secs_list(value: &str) -> Option<Vec<u64>> {
    let parsed: Option<Vec<u64>> = value
        .split(',')
        .map(|part| part.trim().parse::<u64>().ok().filter(|secs| *secs > 0))
        .collect();
    parsed.filter(|list| !list.is_empty())
}

/// `lat,lng`, or empty / `none` for no default.
pub(super) fn parse_location(value: &str) -> Result<Option<Coordinate>, String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    let Some((lat, lng)) = value.split_once(',') else {
        return Err("expected 'latitude,longitude' or 'none'".to_string());
    };
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| "latitude is not a number".to_string())?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|_| "longitude is not a number".to_string())?;
    Coordinate::new(lat, lng)
        .map(Some)
        .map_err(|e| e.to_string())
}

fn parse_url(value: &str) -> Result<Option<String>, &'static str> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err("must start with http:// or https://");
    }
    Ok(Some(value.trim_end_matches('/').to_string()))
}

/// Parse a boolean value from config.
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
