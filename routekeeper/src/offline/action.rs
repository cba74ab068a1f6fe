//! Queued mutations and the offline records kept beside them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::coord::Coordinate;

/// Retries allowed before a pending action is evicted.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    StatusUpdate,
    LocationUpdate,
    DeliveryData,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::StatusUpdate => "STATUS_UPDATE",
            ActionType::LocationUpdate => "LOCATION_UPDATE",
            ActionType::DeliveryData => "DELIVERY_DATA",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation waiting for the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl PendingAction {
    pub fn new(action_type: ActionType, payload: Value) -> Self {
        Self::with_max_retries(action_type, payload, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(action_type: ActionType, payload: Value, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type,
            payload,
            timestamp: Utc::now(),
            retry_count: 0,
            max_retries,
        }
    }

    /// Count a failed sync attempt. Returns true once the action is spent.
    pub fn record_failure(&mut self) -> bool {
        self.retry_count = self.retry_count.saturating_add(1);
        self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Delivery a status update belongs to. `None` for other action types.
    pub fn status_delivery_id(&self) -> Option<&str> {
        match self.action_type {
            ActionType::StatusUpdate => self.payload.get("delivery_id")?.as_str(),
            _ => None,
        }
    }
}

/// A location saved while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineLocation {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    pub saved_at: DateTime<Utc>,
}

/// A status change recorded while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub delivery_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinate>,
    pub recorded_at: DateTime<Utc>,
}

/// Payload of a [`ActionType::StatusUpdate`] action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdatePayload {
    pub delivery_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinate>,
}

/// Payload of a [`ActionType::LocationUpdate`] action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdatePayload {
    pub delivery_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl LocationUpdatePayload {
    pub fn new(delivery_id: impl Into<String>, coordinate: &Coordinate) -> Self {
        Self {
            delivery_id: delivery_id.into(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            accuracy: coordinate.accuracy,
            speed: None,
            heading: None,
        }
    }
}

/// Offline copy of the active delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySnapshot {
    pub record: Value,
    pub saved_at: DateTime<Utc>,
}
