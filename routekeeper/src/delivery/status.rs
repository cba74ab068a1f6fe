//! Delivery states and the transition table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a delivery is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Assigned,
    HeadingToPickup,
    AtPickup,
    PickedUp,
    HeadingToDelivery,
    AtDelivery,
    Delivered,
}

/// Every allowed transition. Each state has at most one successor.
pub const TRANSITIONS: &[(DeliveryStatus, DeliveryStatus)] = &[
    (DeliveryStatus::Assigned, DeliveryStatus::HeadingToPickup),
    (DeliveryStatus::HeadingToPickup, DeliveryStatus::AtPickup),
    (DeliveryStatus::AtPickup, DeliveryStatus::PickedUp),
    (DeliveryStatus::PickedUp, DeliveryStatus::HeadingToDelivery),
    (DeliveryStatus::HeadingToDelivery, DeliveryStatus::AtDelivery),
    (DeliveryStatus::AtDelivery, DeliveryStatus::Delivered),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown delivery status '{0}'")]
pub struct UnknownStatus(pub String);

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 7] = [
        DeliveryStatus::Assigned,
        DeliveryStatus::HeadingToPickup,
        DeliveryStatus::AtPickup,
        DeliveryStatus::PickedUp,
        DeliveryStatus::HeadingToDelivery,
        DeliveryStatus::AtDelivery,
        DeliveryStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::HeadingToPickup => "heading_to_pickup",
            DeliveryStatus::AtPickup => "at_pickup",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::HeadingToDelivery => "heading_to_delivery",
            DeliveryStatus::AtDelivery => "at_delivery",
            DeliveryStatus::Delivered => "delivered",
        }
    }

    /// Human-readable label for notices and the CLI.
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryStatus::Assigned => "Assigned",
            DeliveryStatus::HeadingToPickup => "Heading to pickup",
            DeliveryStatus::AtPickup => "At pickup",
            DeliveryStatus::PickedUp => "Picked up",
            DeliveryStatus::HeadingToDelivery => "Heading to delivery",
            DeliveryStatus::AtDelivery => "At delivery",
            DeliveryStatus::Delivered => "Delivered",
        }
    }

    /// The only state reachable from this one, per [`TRANSITIONS`].
    pub fn allowed_successor(&self) -> Option<DeliveryStatus> {
        TRANSITIONS
            .iter()
            .find(|(from, _)| from == self)
            .map(|(_, to)| *to)
    }

    pub fn can_transition(&self, to: DeliveryStatus) -> bool {
        TRANSITIONS.contains(&(*self, to))
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_successor().is_none()
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
