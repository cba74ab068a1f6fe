//! Contract of the remote delivery API.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::record::DeliveryTrackingRecord;
use super::status::DeliveryStatus;
use crate::coord::Coordinate;
use crate::location::LocationSample;
use crate::offline::LocationUpdatePayload;

/// Server error code for a transition the server does not accept.
pub const INVALID_STATUS_TRANSITION: &str = "INVALID_STATUS_TRANSITION";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryApiError {
    /// No response from the server.
    #[error("delivery API unreachable: {0}")]
    Unreachable(String),

    /// The server answered with an error.
    #[error("delivery API rejected the request: {message}")]
    Rejected {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("invalid delivery API response: {0}")]
    Decode(String),
}

impl DeliveryApiError {
    /// The server refused a status change as out of order.
    pub fn is_invalid_transition(&self) -> bool {
        match self {
            DeliveryApiError::Rejected { status, code, .. } => {
                code.as_deref() == Some(INVALID_STATUS_TRANSITION) || *status == Some(409)
            }
            _ => false,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, DeliveryApiError::Unreachable(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryApiError::Rejected { status, .. } => *status,
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            DeliveryApiError::Rejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Body of `PUT /delivery/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinate>,
}

impl StatusUpdateRequest {
    pub fn new(status: DeliveryStatus) -> Self {
        Self {
            status,
            notes: None,
            location: None,
        }
    }
}

/// Body of `PUT /delivery/{id}/location`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl From<&LocationSample> for LocationReport {
    fn from(sample: &LocationSample) -> Self {
        Self {
            latitude: sample.coordinate.latitude,
            longitude: sample.coordinate.longitude,
            accuracy: sample.coordinate.accuracy,
            speed: sample.speed,
            heading: sample.heading,
        }
    }
}

impl From<LocationUpdatePayload> for LocationReport {
    fn from(payload: LocationUpdatePayload) -> Self {
        Self {
            latitude: payload.latitude,
            longitude: payload.longitude,
            accuracy: payload.accuracy,
            speed: payload.speed,
            heading: payload.heading,
        }
    }
}

/// Remote delivery API.
///
/// Implemented over HTTP by [`super::HttpDeliveryApi`]; tests use mocks.
pub trait DeliveryApi: Send + Sync {
    /// `GET /delivery/{id}`
    fn get_delivery<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<DeliveryTrackingRecord, DeliveryApiError>>;

    /// `PUT /delivery/{id}/status`
    fn update_status<'a>(
        &'a self,
        id: &'a str,
        request: &'a StatusUpdateRequest,
    ) -> BoxFuture<'a, Result<(), DeliveryApiError>>;

    /// `PUT /delivery/{id}/location`
    fn update_location<'a>(
        &'a self,
        id: &'a str,
        report: &'a LocationReport,
    ) -> BoxFuture<'a, Result<(), DeliveryApiError>>;
}

/// `{success, data}` or `{success: false, error: {code, message}}`.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Decode a response body given its HTTP status.
///
/// Returns the envelope's `data`, which may be absent on success.
pub fn decode_envelope<T: DeserializeOwned>(
    status: u16,
    body: &[u8],
) -> Result<Option<T>, DeliveryApiError> {
    let envelope: ApiEnvelope<T> = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) if status >= 400 => {
            return Err(DeliveryApiError::Rejected {
                status: Some(status),
                code: None,
                message: format!("HTTP {status}: {e}"),
            });
        }
        Err(e) => return Err(DeliveryApiError::Decode(e.to_string())),
    };

    if envelope.success && status < 400 {
        return Ok(envelope.data);
    }

    let error = envelope.error.unwrap_or(ApiErrorBody {
        code: None,
        message: None,
    });
    Err(DeliveryApiError::Rejected {
        status: Some(status),
        code: error.code,
        message: error
            .message
            .unwrap_or_else(|| format!("request failed with HTTP {status}")),
    })
}
