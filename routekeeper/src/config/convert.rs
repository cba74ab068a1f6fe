//! Conversion from file settings into component configuration.

use std::time::Duration;

use super::settings::ConfigFile;
use crate::delivery::DeliveryConfig;
use crate::location::{LocationServiceConfig, PositionOptions};
use crate::offline::OfflineQueueConfig;
use crate::recovery::RecoveryConfig;
use crate::viewport::{LoopBreakerConfig, ViewportControllerConfig};

impl ConfigFile {
    pub fn location_config(&self) -> LocationServiceConfig {
        let s = &self.location;
        LocationServiceConfig {
            timeout_margin: Duration::from_millis(s.timeout_margin_ms),
            fallback_timeouts: s
                .fallback_timeouts_secs
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
            max_last_known_age: Duration::from_secs(s.max_last_known_age_secs),
            default_location: s.default_location,
            history_capacity: s.history_capacity,
            position_options: PositionOptions {
                high_accuracy: s.high_accuracy,
                timeout: Duration::from_secs(s.fix_timeout_secs),
                distance_filter_m: s.distance_filter_m,
                ..PositionOptions::default()
            },
        }
    }

    pub fn offline_config(&self) -> OfflineQueueConfig {
        OfflineQueueConfig {
            max_retries: self.offline.max_retries,
            status_history_capacity: self.offline.status_history_capacity,
            location_history_capacity: self.offline.location_history_capacity,
            delivery_data_max_age: Duration::from_secs(
                self.offline.delivery_data_max_age_hours * 3600,
            ),
        }
    }

    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            rate_limit_wait: Duration::from_secs(self.recovery.rate_limit_wait_secs),
            history_capacity: self.recovery.history_capacity,
            default_location: self.location.default_location,
        }
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            confirm_attempts: self.delivery.confirm_attempts,
            confirm_backoff: Duration::from_millis(self.delivery.confirm_backoff_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery.request_timeout_secs)
    }

    pub fn viewport_config(&self) -> ViewportControllerConfig {
        ViewportControllerConfig {
            debounce: Duration::from_millis(self.viewport.debounce_ms),
            center_threshold: self.viewport.center_threshold_deg,
            span_threshold: self.viewport.span_threshold_deg,
            loop_breaker: LoopBreakerConfig {
                window: Duration::from_millis(self.viewport.loop_window_ms),
                ceiling: self.viewport.loop_ceiling,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_component_defaults() {
        let config = ConfigFile::default();

        let location = config.location_config();
        let expected = LocationServiceConfig::default();
        assert_eq!(location.fallback_timeouts, expected.fallback_timeouts);
        assert_eq!(location.timeout_margin, expected.timeout_margin);
        assert_eq!(location.max_last_known_age, expected.max_last_known_age);
        assert_eq!(location.default_location, expected.default_location);

        let offline = config.offline_config();
        assert_eq!(
            offline.delivery_data_max_age,
            OfflineQueueConfig::default().delivery_data_max_age
        );

        let recovery = config.recovery_config();
        assert_eq!(recovery.rate_limit_wait, RecoveryConfig::default().rate_limit_wait);

        let delivery = config.delivery_config();
        assert_eq!(delivery.confirm_backoff, DeliveryConfig::default().confirm_backoff);

        let viewport = config.viewport_config();
        assert_eq!(viewport.debounce, ViewportControllerConfig::default().debounce);
        assert_eq!(viewport.loop_breaker.ceiling, 5);
    }

    #[test]
    fn test_overrides_flow_through() {
        let mut config = ConfigFile::default();
        config.location.default_location = None;
        config.offline.delivery_data_max_age_hours = 2;
        config.viewport.loop_window_ms = 2000;

        assert!(config.location_config().default_location.is_none());
        assert!(config.recovery_config().default_location.is_none());
        assert_eq!(
            config.offline_config().delivery_data_max_age,
            Duration::from_secs(7200)
        );
        assert_eq!(
            config.viewport_config().loop_breaker.window,
            Duration::from_secs(2)
        );
    }
}
