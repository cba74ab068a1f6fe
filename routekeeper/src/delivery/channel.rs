//! Real-time broadcast channel for delivery events.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use super::api::LocationReport;
use super::status::DeliveryStatus;

/// Default capacity of [`BroadcastChannel`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RealtimeEvent {
    StatusUpdate {
        delivery_id: String,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    },
    LocationUpdate {
        delivery_id: String,
        location: LocationReport,
        timestamp: DateTime<Utc>,
    },
}

impl RealtimeEvent {
    pub fn delivery_id(&self) -> &str {
        match self {
            RealtimeEvent::StatusUpdate { delivery_id, .. }
            | RealtimeEvent::LocationUpdate { delivery_id, .. } => delivery_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("real-time channel closed")]
    Closed,

    #[error("real-time transport error: {0}")]
    Transport(String),
}

/// Push channel shared with the other parties of a delivery.
pub trait RealtimeChannel: Send + Sync {
    fn emit(&self, event: RealtimeEvent) -> BoxFuture<'_, Result<(), ChannelError>>;

    /// Receive every event emitted after this call.
    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent>;
}

/// In-process [`RealtimeChannel`] over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl BroadcastChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl RealtimeChannel for BroadcastChannel {
    fn emit(&self, event: RealtimeEvent) -> BoxFuture<'_, Result<(), ChannelError>> {
        async move {
            // No listeners is not an error for a broadcast.
            if self.tx.send(event).is_err() {
                tracing::trace!("Real-time event emitted with no listeners");
            }
            Ok(())
        }
        .boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }
}
