//! The per-order record that moves through the delivery states.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::DeliveryStatus;
use crate::coord::Coordinate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTrackingRecord {
    pub id: String,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub pickup_location: Option<Coordinate>,
    #[serde(default)]
    pub delivery_location: Option<Coordinate>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub delivery_person_id: Option<String>,
    /// When each status was reached.
    #[serde(default)]
    pub timestamps: BTreeMap<DeliveryStatus, DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl DeliveryTrackingRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut timestamps = BTreeMap::new();
        timestamps.insert(DeliveryStatus::Assigned, now);
        Self {
            id: id.into(),
            status: DeliveryStatus::Assigned,
            pickup_location: None,
            delivery_location: None,
            order_id: None,
            delivery_person_id: None,
            timestamps,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_locations(mut self, pickup: Coordinate, delivery: Coordinate) -> Self {
        self.pickup_location = Some(pickup);
        self.delivery_location = Some(delivery);
        self
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_courier(mut self, delivery_person_id: impl Into<String>) -> Self {
        self.delivery_person_id = Some(delivery_person_id.into());
        self
    }

    /// Move to `status` and stamp it. Does not consult the transition table.
    pub fn mark(&mut self, status: DeliveryStatus, at: DateTime<Utc>) {
        self.status = status;
        self.timestamps.insert(status, at);
        self.updated_at = at;
    }

    pub fn reached_at(&self, status: DeliveryStatus) -> Option<DateTime<Utc>> {
        self.timestamps.get(&status).copied()
    }
}
