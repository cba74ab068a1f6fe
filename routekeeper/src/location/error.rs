//! Location service errors.

use std::time::Duration;

use thiserror::Error;

use super::provider::ProviderError;
use crate::coord::CoordError;
use crate::store::StoreError;

#[derive(Debug, Clone, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("location request timed out after {0:?}")]
    Timeout(Duration),

    /// The platform gave up before our own guard fired.
    #[error("location request timed out on the platform")]
    PlatformTimeout,

    #[error("provider returned invalid coordinates: {0}")]
    InvalidCoordinates(#[from] CoordError),

    #[error("location error: {0}")]
    Unknown(String),

    /// Every live attempt failed and there was nothing to fall back on.
    #[error("no location after {attempts} attempts and no fallback configured")]
    Exhausted { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ProviderError> for LocationError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::PermissionDenied => LocationError::PermissionDenied,
            ProviderError::PositionUnavailable(reason) => {
                LocationError::PositionUnavailable(reason)
            }
            ProviderError::Timeout => LocationError::PlatformTimeout,
            ProviderError::Other(reason) => LocationError::Unknown(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_timeout_stays_a_timeout() {
        let err = LocationError::from(ProviderError::Timeout);
        assert!(matches!(err, LocationError::PlatformTimeout));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_provider_errors_map_by_kind() {
        assert!(matches!(
            LocationError::from(ProviderError::PermissionDenied),
            LocationError::PermissionDenied
        ));
        assert!(matches!(
            LocationError::from(ProviderError::PositionUnavailable("indoors".into())),
            LocationError::PositionUnavailable(reason) if reason == "indoors"
        ));
    }
}
