//! Well-known store keys.

/// Offline queue of [`crate::offline::PendingAction`]s.
pub const PENDING_ACTIONS: &str = "offline.pending_actions";

/// Bounded history of locations saved while offline.
pub const LOCATION_HISTORY: &str = "offline.location_history";

/// Bounded history of status changes recorded while offline.
pub const STATUS_HISTORY: &str = "offline.status_history";

/// Snapshot of the active delivery kept for offline use.
pub const DELIVERY_DATA: &str = "offline.delivery_data";

/// Timestamp of the last completed sync pass.
pub const LAST_SYNC: &str = "offline.last_sync";

/// Most recent accepted location sample.
pub const LAST_KNOWN_LOCATION: &str = "location.last_known";

/// Bounded history of samples accepted by the location service.
pub const LOCATION_SAMPLES: &str = "location.history";

/// The delivery currently being worked; cleared on `delivered`.
pub const ACTIVE_DELIVERY: &str = "delivery.active";

/// Every key owned by the offline subsystem, for resets.
pub const OFFLINE_KEYS: &[&str] = &[
    PENDING_ACTIONS,
    LOCATION_HISTORY,
    STATUS_HISTORY,
    DELIVERY_DATA,
    LAST_SYNC,
];
