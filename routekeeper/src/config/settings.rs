//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;

use crate::coord::Coordinate;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub location: LocationSettings,
    pub offline: OfflineSettings,
    pub recovery: RecoverySettings,
    pub delivery: DeliverySettings,
    pub viewport: ViewportSettings,
    pub logging: LoggingSettings,
}

/// `[location]`
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSettings {
    /// Subtracted from the fix timeout to get the guard timeout.
    pub timeout_margin_ms: u64,
    /// Timeouts of the live attempts in the fallback chain.
    pub fallback_timeouts_secs: Vec<u64>,
    /// Oldest last known location the fallback chain accepts.
    pub max_last_known_age_secs: u64,
    /// Last resort location. `None` disables it.
    pub default_location: Option<Coordinate>,
    pub history_capacity: usize,
    pub high_accuracy: bool,
    pub fix_timeout_secs: u64,
    pub distance_filter_m: f64,
}

/// `[offline]`
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineSettings {
    pub max_retries: u32,
    pub status_history_capacity: usize,
    pub location_history_capacity: usize,
    /// Snapshots of the active delivery older than this are purged.
    pub delivery_data_max_age_hours: u64,
}

/// `[recovery]`
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverySettings {
    pub rate_limit_wait_secs: u64,
    pub history_capacity: usize,
}

/// `[delivery]`
#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySettings {
    /// Base URL of the delivery API. Unset means no HTTP client.
    pub api_base_url: Option<String>,
    pub request_timeout_secs: u64,
    pub confirm_attempts: u32,
    pub confirm_backoff_ms: u64,
}

/// `[viewport]`
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportSettings {
    pub debounce_ms: u64,
    pub center_threshold_deg: f64,
    pub span_threshold_deg: f64,
    pub loop_window_ms: u64,
    pub loop_ceiling: u32,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
}
