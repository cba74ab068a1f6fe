//! Replays queued delivery actions against the remote API.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;

use super::api::{DeliveryApi, DeliveryApiError, LocationReport, StatusUpdateRequest};
use super::channel::{RealtimeChannel, RealtimeEvent};
use super::status::DeliveryStatus;
use crate::offline::{
    ActionError, ActionHandler, ActionType, LocationUpdatePayload, PendingAction,
    StatusUpdatePayload,
};

/// [`ActionHandler`] for `STATUS_UPDATE` and `LOCATION_UPDATE` actions.
///
/// A server refusing a replayed status as an invalid transition is
/// reported as [`ActionError::Conflict`]. Confirmed status changes are
/// announced on the real-time channel, stamped with the time they were
/// made offline.
pub struct DeliveryActionHandler {
    api: Arc<dyn DeliveryApi>,
    channel: Option<Arc<dyn RealtimeChannel>>,
}

impl DeliveryActionHandler {
    pub fn new(api: Arc<dyn DeliveryApi>) -> Self {
        Self { api, channel: None }
    }

    pub fn with_channel(mut self, channel: Arc<dyn RealtimeChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    async fn replay_status(&self, action: &PendingAction) -> Result<(), ActionError> {
        let payload: StatusUpdatePayload = decode(action)?;
        let status: DeliveryStatus = payload
            .status
            .parse()
            .map_err(|e| ActionError::Malformed(format!("{e}")))?;
        let request = StatusUpdateRequest {
            status,
            notes: payload.notes,
            location: payload.location,
        };
        self.api
            .update_status(&payload.delivery_id, &request)
            .await
            .map_err(action_error)?;

        if let Some(channel) = &self.channel {
            let event = RealtimeEvent::StatusUpdate {
                delivery_id: payload.delivery_id,
                status,
                timestamp: action.timestamp,
            };
            if let Err(e) = channel.emit(event).await {
                tracing::warn!(error = %e, "Failed to emit replayed status update");
            }
        }
        Ok(())
    }

    async fn replay_location(&self, action: &PendingAction) -> Result<(), ActionError> {
        let payload: LocationUpdatePayload = decode(action)?;
        let delivery_id = payload.delivery_id.clone();
        let report = LocationReport::from(payload);
        self.api
            .update_location(&delivery_id, &report)
            .await
            .map_err(action_error)
    }
}

impl ActionHandler for DeliveryActionHandler {
    fn handle<'a>(&'a self, action: &'a PendingAction) -> BoxFuture<'a, Result<(), ActionError>> {
        async move {
            match action.action_type {
                ActionType::StatusUpdate => self.replay_status(action).await,
                ActionType::LocationUpdate => self.replay_location(action).await,
                ActionType::DeliveryData => Err(ActionError::Malformed(format!(
                    "{} actions are not replayed by the delivery handler",
                    action.action_type
                ))),
            }
        }
        .boxed()
    }
}

fn decode<T: DeserializeOwned>(action: &PendingAction) -> Result<T, ActionError> {
    serde_json::from_value(action.payload.clone())
        .map_err(|e| ActionError::Malformed(e.to_string()))
}

fn action_error(e: DeliveryApiError) -> ActionError {
    match e {
        DeliveryApiError::Unreachable(reason) => ActionError::Unreachable(reason),
        e if e.is_invalid_transition() => ActionError::Conflict(e.to_string()),
        other => ActionError::Rejected(other.to_string()),
    }
}
