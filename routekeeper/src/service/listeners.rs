//! Background tasks that carry failures and follow-ups between components.
//!
//! Components publish what went wrong on their own broadcast channels; these
//! listeners hand it to the recovery engine or to the component that has to
//! react.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::delivery::DeliveryStateMachine;
use crate::offline::{OfflineQueue, PendingAction, SyncEvent};
use crate::recovery::{ErrorContext, ErrorRecoveryEngine, Failure, RecoveryEvent, ServiceHint};
use crate::viewport::ViewportController;

const SYNC_OPERATION: &str = "sync_pending_data";

/// Route sync failures to recovery and refresh deliveries after conflicts.
pub fn spawn_sync_listener(
    offline: &OfflineQueue,
    recovery: Arc<ErrorRecoveryEngine>,
    delivery: Arc<DeliveryStateMachine>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = offline.subscribe();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(SyncEvent::Failed {
                    reason,
                    corrupted_key,
                }) => {
                    let context = match corrupted_key {
                        Some(key) => ErrorContext::for_storage_key(key),
                        None => ErrorContext::new().service(ServiceHint::Sync),
                    };
                    recovery
                        .handle_error(Failure::new(reason), context.operation(SYNC_OPERATION))
                        .await;
                }
                Ok(SyncEvent::PermanentlyFailed(action)) => {
                    let failure = Failure::new(format!(
                        "pending {} action dropped after {} attempts",
                        action.action_type, action.retry_count
                    ));
                    let context = ErrorContext::new()
                        .service(ServiceHint::Sync)
                        .operation(SYNC_OPERATION);
                    recovery.handle_error(failure, context).await;
                }
                Ok(SyncEvent::Conflict(action)) => refresh_after_conflict(&delivery, &action).await,
                Ok(SyncEvent::Completed { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Sync listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Sync listener stopped");
    })
}

async fn refresh_after_conflict(delivery: &DeliveryStateMachine, action: &PendingAction) {
    let Some(conflicted) = action.status_delivery_id() else {
        return;
    };
    let active = delivery.current().map(|record| record.id);
    if active.as_deref() != Some(conflicted) {
        debug!(delivery_id = conflicted, "Conflict for an inactive delivery");
        return;
    }
    info!(delivery_id = conflicted, "Replayed status refused, refreshing delivery");
    // Failures are reported to recovery by the state machine.
    if let Err(e) = delivery.refresh_from_server().await {
        warn!(delivery_id = conflicted, error = %e, "Refresh after conflict failed");
    }
}

/// Apply recovery announcements that target the map.
pub fn spawn_recovery_listener(
    recovery: &ErrorRecoveryEngine,
    viewport: Arc<ViewportController>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = recovery.subscribe();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(RecoveryEvent::ResetViewport(reset)) => {
                    info!(viewport = ?reset, "Resetting map viewport");
                    viewport.reset_to(reset);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Recovery listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Recovery listener stopped");
    })
}
