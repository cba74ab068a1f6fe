//! Service error types.

use std::fmt;

use crate::delivery::{DeliveryApiError, TransitionError};
use crate::location::LocationError;
use crate::offline::OfflineError;
use crate::store::StoreError;

/// Errors that can occur while assembling or starting the services.
#[derive(Debug)]
pub enum ServiceError {
    /// A collaborator with no usable default was not supplied
    MissingComponent(&'static str),
    /// Failed to create the delivery API client
    ApiClient(DeliveryApiError),
    /// Failed to hydrate the offline queue
    Offline(OfflineError),
    /// Failed to restore the active delivery
    Restore(TransitionError),
    /// No location, even after recovery
    Location(LocationError),
}

impl ServiceError {
    /// Store key whose value failed to decode, if that is what went wrong.
    pub fn corrupted_key(&self) -> Option<&str> {
        let store: &StoreError = match self {
            Self::Offline(OfflineError::Store(e)) => e,
            Self::Restore(TransitionError::Store(e)) => e,
            Self::Restore(TransitionError::Offline(OfflineError::Store(e))) => e,
            _ => return None,
        };
        store.corrupted_key()
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingComponent(name) => write!(f, "Missing component: {}", name),
            Self::ApiClient(e) => write!(f, "Delivery API client error: {}", e),
            Self::Offline(e) => write!(f, "Offline queue error: {}", e),
            Self::Restore(e) => write!(f, "Could not restore active delivery: {}", e),
            Self::Location(e) => write!(f, "Location unavailable: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ApiClient(e) => Some(e),
            Self::Offline(e) => Some(e),
            Self::Restore(e) => Some(e),
            Self::Location(e) => Some(e),
            Self::MissingComponent(_) => None,
        }
    }
}

impl From<DeliveryApiError> for ServiceError {
    fn from(e: DeliveryApiError) -> Self {
        Self::ApiClient(e)
    }
}

impl From<OfflineError> for ServiceError {
    fn from(e: OfflineError) -> Self {
        Self::Offline(e)
    }
}

impl From<TransitionError> for ServiceError {
    fn from(e: TransitionError) -> Self {
        Self::Restore(e)
    }
}
