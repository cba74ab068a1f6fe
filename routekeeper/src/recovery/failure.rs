//! Failures handed to the recovery engine and the context around them.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;

use crate::coord::CoordError;
use crate::delivery::{DeliveryApiError, TransitionError};
use crate::location::LocationError;
use crate::offline::OfflineError;
use crate::store::StoreError;

/// A failure as the recovery engine sees it.
///
/// Module errors convert into this via `From`; HTTP-ish failures carry the
/// response status and the server's error code when there was one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    pub status: Option<u16>,
    pub code: Option<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {})", self.message, status),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for Failure {}

impl From<CoordError> for Failure {
    fn from(e: CoordError) -> Self {
        Failure::new(format!("invalid coordinate: {e}"))
    }
}

impl From<StoreError> for Failure {
    fn from(e: StoreError) -> Self {
        Failure::new(e.to_string())
    }
}

impl From<OfflineError> for Failure {
    fn from(e: OfflineError) -> Self {
        match e {
            OfflineError::Store(inner) => inner.into(),
        }
    }
}

impl From<LocationError> for Failure {
    fn from(e: LocationError) -> Self {
        match e {
            LocationError::Store(inner) => inner.into(),
            other => Failure::new(other.to_string()),
        }
    }
}

impl From<DeliveryApiError> for Failure {
    fn from(e: DeliveryApiError) -> Self {
        match e {
            DeliveryApiError::Rejected {
                status,
                code,
                message,
            } => Failure {
                message,
                status,
                code,
            },
            DeliveryApiError::Decode(reason) => {
                Failure::new(format!("could not decode delivery API response: {reason}"))
            }
            other @ DeliveryApiError::Unreachable(_) => Failure::new(other.to_string()),
        }
    }
}

impl From<TransitionError> for Failure {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Rejected(inner) | TransitionError::Refresh(inner) => inner.into(),
            TransitionError::Offline(inner) => inner.into(),
            TransitionError::Store(inner) => inner.into(),
            other => Failure::new(other.to_string()),
        }
    }
}

/// Caller-supplied hint about which subsystem failed.
///
/// When present it takes precedence over message sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceHint {
    Network,
    Location,
    Api,
    Storage,
    Map,
    Sync,
}

impl std::str::FromStr for ServiceHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "network" => Ok(ServiceHint::Network),
            "location" => Ok(ServiceHint::Location),
            "api" => Ok(ServiceHint::Api),
            "storage" => Ok(ServiceHint::Storage),
            "map" => Ok(ServiceHint::Map),
            "sync" => Ok(ServiceHint::Sync),
            other => Err(format!("unknown service '{other}'")),
        }
    }
}

/// Re-runs the operation that failed. Used by network recovery.
pub type RetryOperation = Arc<dyn Fn() -> BoxFuture<'static, Result<(), Failure>> + Send + Sync>;

/// Everything the engine knows about where a failure happened.
#[derive(Clone, Default)]
pub struct ErrorContext {
    pub service: Option<ServiceHint>,
    pub operation: Option<String>,
    /// Store key holding the data suspected to be corrupt.
    pub storage_key: Option<String>,
    /// Store key of a cached copy that can stand in for a failed API read.
    pub cache_key: Option<String>,
    pub retry: Option<RetryOperation>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a value that failed to decode from the store.
    pub fn for_storage_key(key: impl Into<String>) -> Self {
        Self::new().service(ServiceHint::Storage).storage_key(key)
    }

    pub fn service(mut self, service: ServiceHint) -> Self {
        self.service = Some(service);
        self
    }

    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn retry(mut self, retry: RetryOperation) -> Self {
        self.retry = Some(retry);
        self
    }
}

impl fmt::Debug for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorContext")
            .field("service", &self.service)
            .field("operation", &self.operation)
            .field("storage_key", &self.storage_key)
            .field("cache_key", &self.cache_key)
            .field("retry", &self.retry.is_some())
            .finish()
    }
}
