//! Default values and constants for all configuration settings.
//!
//! Component defaults are owned by the components themselves; this module
//! turns them into INI-friendly units and adds the file-level defaults.

use std::path::PathBuf;

use super::settings::*;
use crate::coord::DEFAULT_REGION_CENTER;
use crate::delivery::{DEFAULT_CONFIRM_ATTEMPTS, DEFAULT_CONFIRM_BACKOFF, DEFAULT_HTTP_TIMEOUT};
use crate::location::{
    DEFAULT_DISTANCE_FILTER_M, DEFAULT_FALLBACK_TIMEOUTS, DEFAULT_FIX_TIMEOUT,
    DEFAULT_HISTORY_CAPACITY, DEFAULT_MAX_LAST_KNOWN_AGE, DEFAULT_TIMEOUT_MARGIN,
};
use crate::offline::{
    DEFAULT_DELIVERY_DATA_MAX_AGE, DEFAULT_LOCATION_HISTORY_CAPACITY, DEFAULT_MAX_RETRIES,
    DEFAULT_STATUS_HISTORY_CAPACITY,
};
use crate::recovery::{DEFAULT_ERROR_HISTORY_CAPACITY, DEFAULT_RATE_LIMIT_WAIT};
use crate::viewport::{
    DEFAULT_CENTER_THRESHOLD_DEG, DEFAULT_DEBOUNCE, DEFAULT_LOOP_CEILING, DEFAULT_LOOP_WINDOW,
    DEFAULT_SPAN_THRESHOLD_DEG,
};

/// Directory name under the home directory.
pub const CONFIG_DIR_NAME: &str = ".routekeeper";

pub const CONFIG_FILE_NAME: &str = "config.ini";

pub const DEFAULT_LOG_FILE: &str = "routekeeper.log";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory (~/.routekeeper/logs).
pub fn default_log_dir() -> PathBuf {
    super::file::config_directory().join("logs")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            location: LocationSettings {
                timeout_margin_ms: DEFAULT_TIMEOUT_MARGIN.as_millis() as u64,
                fallback_timeouts_secs: DEFAULT_FALLBACK_TIMEOUTS
                    .iter()
                    .map(|t| t.as_secs())
                    .collect(),
                max_last_known_age_secs: DEFAULT_MAX_LAST_KNOWN_AGE.as_secs(),
                default_location: Some(DEFAULT_REGION_CENTER),
                history_capacity: DEFAULT_HISTORY_CAPACITY,
                high_accuracy: true,
                fix_timeout_secs: DEFAULT_FIX_TIMEOUT.as_secs(),
                distance_filter_m: DEFAULT_DISTANCE_FILTER_M,
            },
            offline: OfflineSettings {
                max_retries: DEFAULT_MAX_RETRIES,
                status_history_capacity: DEFAULT_STATUS_HISTORY_CAPACITY,
                location_history_capacity: DEFAULT_LOCATION_HISTORY_CAPACITY,
                delivery_data_max_age_hours: DEFAULT_DELIVERY_DATA_MAX_AGE.as_secs() / 3600,
            },
            recovery: RecoverySettings {
                rate_limit_wait_secs: DEFAULT_RATE_LIMIT_WAIT.as_secs(),
                history_capacity: DEFAULT_ERROR_HISTORY_CAPACITY,
            },
            delivery: DeliverySettings {
                api_base_url: None,
                request_timeout_secs: DEFAULT_HTTP_TIMEOUT.as_secs(),
                confirm_attempts: DEFAULT_CONFIRM_ATTEMPTS,
                confirm_backoff_ms: DEFAULT_CONFIRM_BACKOFF.as_millis() as u64,
            },
            viewport: ViewportSettings {
                debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
                center_threshold_deg: DEFAULT_CENTER_THRESHOLD_DEG,
                span_threshold_deg: DEFAULT_SPAN_THRESHOLD_DEG,
                loop_window_ms: DEFAULT_LOOP_WINDOW.as_millis() as u64,
                loop_ceiling: DEFAULT_LOOP_CEILING,
            },
            logging: LoggingSettings {
                directory: default_log_dir(),
                file: DEFAULT_LOG_FILE.to_string(),
                level: DEFAULT_LOG_LEVEL.to_string(),
            },
        }
    }
}
