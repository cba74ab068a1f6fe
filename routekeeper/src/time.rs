//! Time-related utility functions.
//!
//! Persisted records carry wall-clock `DateTime<Utc>` stamps; staleness
//! checks compare those against "now" and need to tolerate clock skew.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// How long ago `timestamp` was.
///
/// Timestamps in the future (device clock moved backwards, server clock
/// ahead) count as zero age rather than failing.
pub fn age_of(timestamp: DateTime<Utc>) -> Duration {
    Utc::now()
        .signed_duration_since(timestamp)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// True if `timestamp` is strictly older than `max_age`.
pub fn is_older_than(timestamp: DateTime<Utc>, max_age: Duration) -> bool {
    age_of(timestamp) > max_age
}
