//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let fallback_timeouts = config
        .location
        .fallback_timeouts_secs
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let default_location = config
        .location
        .default_location
        .map(|c| format!("{},{}", c.latitude, c.longitude))
        .unwrap_or_else(|| "none".to_string());
    let api_base_url = config.delivery.api_base_url.as_deref().unwrap_or("");

    format!(
        r#"[location]
; Safety margin subtracted from the fix timeout for the outer guard (default: 1000)
timeout_margin_ms = {}
; Timeouts in seconds for successive live attempts when resolving a location
; with fallback (default: 15,10,5)
fallback_timeouts_secs = {}
; Oldest last known location accepted as a fallback, in seconds (default: 21600)
max_last_known_age_secs = {}
; Last resort location as latitude,longitude, or none to fail instead
default_location = {}
; Accepted samples kept in the location history (default: 100)
history_capacity = {}
; Ask the platform for its most accurate fixes (default: true)
high_accuracy = {}
; Timeout in seconds for a single fix (default: 15)
fix_timeout_secs = {}
; Metres of movement between tracking reports (default: 10)
distance_filter_m = {}

[offline]
; Failed sync attempts before a pending action is dropped (default: 3)
max_retries = {}
; Status changes kept while offline (default: 50)
status_history_capacity = {}
; Locations kept while offline (default: 100)
location_history_capacity = {}
; Offline delivery data older than this many hours is purged (default: 24)
delivery_data_max_age_hours = {}

[recovery]
; Seconds to wait after a rate-limit response (default: 10)
rate_limit_wait_secs = {}
; Handled errors kept in the recovery history (default: 50)
history_capacity = {}

[delivery]
; Base URL of the delivery API, e.g. https://api.example.com/v1
api_base_url = {}
; Timeout in seconds for a single API request (default: 15)
request_timeout_secs = {}
; Attempts at confirming a status change (default: 3)
confirm_attempts = {}
; Base of the linear backoff between attempts, in milliseconds (default: 1000)
confirm_backoff_ms = {}

[viewport]
; Quiet period before a map region change is forwarded (default: 350)
debounce_ms = {}
; Minimum center movement in degrees to forward a change (default: 0.001)
center_threshold_deg = {}
; Minimum span change in degrees to forward a change (default: 0.01)
span_threshold_deg = {}
; Loop breaker window in milliseconds (default: 1000)
loop_window_ms = {}
; Region changes allowed per window before suppression (default: 5)
loop_ceiling = {}

[logging]
; Directory for log files (default: ~/.routekeeper/logs)
directory = {}
; Log file name, cleared at the start of each session (default: routekeeper.log)
file = {}
; Log level when RUST_LOG is not set: error, warn, info, debug, trace (default: info)
level = {}
"#,
        config.location.timeout_margin_ms,
        fallback_timeouts,
        config.location.max_last_known_age_secs,
        default_location,
        config.location.history_capacity,
        config.location.high_accuracy,
        config.location.fix_timeout_secs,
        config.location.distance_filter_m,
        config.offline.max_retries,
        config.offline.status_history_capacity,
        config.offline.location_history_capacity,
        config.offline.delivery_data_max_age_hours,
        config.recovery.rate_limit_wait_secs,
        config.recovery.history_capacity,
        api_base_url,
        config.delivery.request_timeout_secs,
        config.delivery.confirm_attempts,
        config.delivery.confirm_backoff_ms,
        config.viewport.debounce_ms,
        config.viewport.center_threshold_deg,
        config.viewport.span_threshold_deg,
        config.viewport.loop_window_ms,
        config.viewport.loop_ceiling,
        path_to_string(&config.logging.directory),
        config.logging.file,
        config.logging.level,
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
