//! Offline Action Queue
//!
//! Keeps the app working without a network. Mutations that could not be
//! sent are queued as [`PendingAction`]s and replayed by per-type
//! [`ActionHandler`]s when connectivity returns. Locations, status changes
//! and the active delivery are also kept in bounded offline histories.
//!
//! # Retry semantics
//!
//! An action's `retry_count` grows only when a sync pass actually tried it
//! and the handler failed. When it reaches `max_retries` the action is
//! evicted and announced as [`SyncEvent::PermanentlyFailed`].
//!
//! Status updates keep their per-delivery order across passes. A handler
//! answering [`ActionError::Conflict`] evicts the update immediately and
//! announces it as [`SyncEvent::Conflict`] so the owner can refresh.

mod action;
mod handler;
mod queue;
mod stats;

pub use action::{
    ActionType, DeliverySnapshot, LocationUpdatePayload, OfflineLocation, PendingAction,
    StatusChange, StatusUpdatePayload, DEFAULT_MAX_RETRIES,
};
pub use handler::{ActionError, ActionHandler};
pub use queue::{
    OfflineError, OfflineQueue, OfflineQueueConfig, DEFAULT_DELIVERY_DATA_MAX_AGE,
    DEFAULT_LOCATION_HISTORY_CAPACITY, DEFAULT_STATUS_HISTORY_CAPACITY,
};
pub use stats::{OfflineStats, SkipReason, SyncEvent, SyncReport};
