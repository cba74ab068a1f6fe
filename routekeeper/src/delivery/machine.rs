//! Delivery status state machine.
//!
//! Transitions are checked against [`TRANSITIONS`](super::TRANSITIONS)
//! before anything else happens. An allowed transition is applied locally
//! first, then confirmed with the server:
//!
//! ```text
//! transition_to(target)
//!   ├─ not in table ──────────────► InvalidTransition (no change, no call)
//!   ├─ offline ───────────────────► queue STATUS_UPDATE, keep local change
//!   └─ PUT status (linear retry)
//!        ├─ ok ───────────────────► emit status_update, persist
//!        ├─ unreachable ──────────► queue STATUS_UPDATE, keep local change
//!        ├─ invalid transition ───► GET delivery, adopt server record
//!        └─ other rejection ──────► revert local change
//! ```
//!
//! Only one transition runs at a time.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api::{DeliveryApi, DeliveryApiError, LocationReport, StatusUpdateRequest};
use super::channel::{RealtimeChannel, RealtimeEvent};
use super::hold::{ActivityHold, TracingHold};
use super::record::DeliveryTrackingRecord;
use super::status::DeliveryStatus;
use crate::coord::Coordinate;
use crate::location::LocationSample;
use crate::offline::{ActionType, OfflineError, OfflineQueue, StatusUpdatePayload};
use crate::recovery::{ErrorContext, ErrorRecoveryEngine, Failure};
use crate::retry::{Backoff, RetryError, RetryPolicy};
use crate::store::{keys, load_json, save_json, KeyValueStore, StoreError};

/// Attempts at confirming a status change with the server.
pub const DEFAULT_CONFIRM_ATTEMPTS: u32 = 3;

/// Base of the linear backoff between confirmation attempts.
pub const DEFAULT_CONFIRM_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Default: 3
    pub confirm_attempts: u32,
    /// Delay is `confirm_backoff * attempt`. Default: 1 s
    pub confirm_backoff: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            confirm_attempts: DEFAULT_CONFIRM_ATTEMPTS,
            confirm_backoff: DEFAULT_CONFIRM_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    #[error("no active delivery")]
    NoActiveDelivery,

    #[error("cannot move delivery from {from} to {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    #[error("delivery is already {0}")]
    AlreadyTerminal(DeliveryStatus),

    /// The server refused the change; its record was adopted instead.
    #[error("server refused {requested}, delivery is {server}")]
    Resynced {
        requested: DeliveryStatus,
        server: DeliveryStatus,
    },

    /// The server rejected the change and the local update was reverted.
    #[error(transparent)]
    Rejected(DeliveryApiError),

    #[error("failed to refresh delivery: {0}")]
    Refresh(DeliveryApiError),

    #[error("status update cancelled")]
    Cancelled,

    #[error(transparent)]
    Offline(#[from] OfflineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How an accepted transition was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The server confirmed the change.
    Confirmed { status: DeliveryStatus, attempts: u32 },
    /// Kept locally and queued for the next sync.
    Queued { status: DeliveryStatus },
}

impl TransitionOutcome {
    pub fn status(&self) -> DeliveryStatus {
        match self {
            TransitionOutcome::Confirmed { status, .. } | TransitionOutcome::Queued { status } => {
                *status
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationReportOutcome {
    Sent,
    Queued,
    /// No delivery in progress.
    Skipped,
}

pub struct DeliveryStateMachine {
    api: Arc<dyn DeliveryApi>,
    channel: Arc<dyn RealtimeChannel>,
    offline: Arc<OfflineQueue>,
    store: Arc<dyn KeyValueStore>,
    hold: Arc<dyn ActivityHold>,
    recovery: Option<Arc<ErrorRecoveryEngine>>,
    config: DeliveryConfig,
    record: RwLock<Option<DeliveryTrackingRecord>>,
    transitions: Mutex<()>,
    shutdown: CancellationToken,
}

impl DeliveryStateMachine {
    pub fn new(
        api: Arc<dyn DeliveryApi>,
        channel: Arc<dyn RealtimeChannel>,
        offline: Arc<OfflineQueue>,
        store: Arc<dyn KeyValueStore>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            api,
            channel,
            offline,
            store,
            hold: Arc::new(TracingHold::new()),
            recovery: None,
            config,
            record: RwLock::new(None),
            transitions: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_activity_hold(mut self, hold: Arc<dyn ActivityHold>) -> Self {
        self.hold = hold;
        self
    }

    /// Hand server rejections and failed refreshes to `recovery`.
    pub fn with_recovery(mut self, recovery: Arc<ErrorRecoveryEngine>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Snapshot of the active delivery.
    pub fn current(&self) -> Option<DeliveryTrackingRecord> {
        self.record.read().unwrap().clone()
    }

    pub fn status(&self) -> Option<DeliveryStatus> {
        self.record.read().unwrap().as_ref().map(|r| r.status)
    }

    /// Make `record` the active delivery.
    pub async fn start(&self, record: DeliveryTrackingRecord) -> Result<(), TransitionError> {
        let _serial = self.transitions.lock().await;
        info!(
            delivery_id = %record.id,
            status = %record.status,
            "Tracking delivery"
        );
        self.set_record(Some(record.clone()));
        self.persist(&record).await?;

        if !record.status.is_terminal() {
            let snapshot = to_json(&record)?;
            self.offline.save_delivery_data_offline(&snapshot).await?;
        }
        Ok(())
    }

    /// Resume the delivery recorded by the active marker, if any.
    pub async fn restore(&self) -> Result<Option<DeliveryTrackingRecord>, TransitionError> {
        let _serial = self.transitions.lock().await;
        let record: Option<DeliveryTrackingRecord> =
            load_json(self.store.as_ref(), keys::ACTIVE_DELIVERY).await?;

        if let Some(record) = &record {
            info!(
                delivery_id = %record.id,
                status = %record.status,
                "Restored active delivery"
            );
            self.set_record(Some(record.clone()));
            self.hold.acquire();
        }
        Ok(record)
    }

    /// Move to the next state in the table.
    pub async fn advance(
        &self,
        notes: Option<String>,
        location: Option<Coordinate>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let current = self.status().ok_or(TransitionError::NoActiveDelivery)?;
        let next = current
            .allowed_successor()
            .ok_or(TransitionError::AlreadyTerminal(current))?;
        self.transition_to(next, notes, location).await
    }

    pub async fn transition_to(
        &self,
        target: DeliveryStatus,
        notes: Option<String>,
        location: Option<Coordinate>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let _serial = self.transitions.lock().await;

        let previous = self.current().ok_or(TransitionError::NoActiveDelivery)?;
        if !previous.status.can_transition(target) {
            warn!(
                delivery_id = %previous.id,
                from = %previous.status,
                to = %target,
                "Rejected status transition"
            );
            return Err(TransitionError::InvalidTransition {
                from: previous.status,
                to: target,
            });
        }

        let mut updated = previous.clone();
        updated.mark(target, Utc::now());
        self.set_record(Some(updated.clone()));

        let request = StatusUpdateRequest {
            status: target,
            notes,
            location,
        };

        if self.offline.is_offline() {
            debug!(delivery_id = %updated.id, status = %target, "Offline, queueing status update");
            return self.settle_offline(&updated, &request).await;
        }

        let policy = RetryPolicy::new(
            self.config.confirm_attempts,
            Backoff::Linear(self.config.confirm_backoff),
        );
        let api = &self.api;
        let id = updated.id.as_str();
        let body = &request;
        let result = policy
            .run_while(
                &self.shutdown,
                move |_| api.update_status(id, body),
                |e: &DeliveryApiError| !e.is_invalid_transition(),
            )
            .await;

        match result {
            Ok(((), attempts)) => {
                info!(
                    delivery_id = %updated.id,
                    status = %target,
                    attempts,
                    "Status update confirmed"
                );
                self.persist(&updated).await?;
                self.announce_status(&updated).await;
                Ok(TransitionOutcome::Confirmed {
                    status: target,
                    attempts,
                })
            }
            Err(RetryError::Cancelled { .. }) => {
                self.set_record(Some(previous));
                Err(TransitionError::Cancelled)
            }
            Err(RetryError::Exhausted { last, attempts } | RetryError::Aborted { last, attempts }) => {
                self.settle_rejection(previous, updated, &request, last, attempts)
                    .await
            }
        }
    }

    async fn settle_offline(
        &self,
        updated: &DeliveryTrackingRecord,
        request: &StatusUpdateRequest,
    ) -> Result<TransitionOutcome, TransitionError> {
        let payload = StatusUpdatePayload {
            delivery_id: updated.id.clone(),
            status: request.status.to_string(),
            notes: request.notes.clone(),
            location: request.location,
        };
        self.offline
            .add_pending_action(ActionType::StatusUpdate, to_json(&payload)?)
            .await?;

        let location = request
            .location
            .and_then(|c| serde_json::to_value(c).ok());
        self.offline
            .save_status_change_offline(
                &updated.id,
                request.status.as_str(),
                request.notes.as_deref(),
                location.as_ref(),
            )
            .await?;

        self.persist(updated).await?;
        Ok(TransitionOutcome::Queued {
            status: request.status,
        })
    }

    async fn settle_rejection(
        &self,
        previous: DeliveryTrackingRecord,
        updated: DeliveryTrackingRecord,
        request: &StatusUpdateRequest,
        error: DeliveryApiError,
        attempts: u32,
    ) -> Result<TransitionOutcome, TransitionError> {
        if error.is_unreachable() {
            warn!(
                delivery_id = %updated.id,
                attempts,
                error = %error,
                "Delivery API unreachable, queueing status update"
            );
            return self.settle_offline(&updated, request).await;
        }

        if error.is_invalid_transition() {
            warn!(
                delivery_id = %updated.id,
                requested = %request.status,
                "Server refused status transition, refreshing"
            );
            return match self.api.get_delivery(&updated.id).await {
                Ok(server) => {
                    let server_status = server.status;
                    self.set_record(Some(server.clone()));
                    self.persist(&server).await?;
                    Err(TransitionError::Resynced {
                        requested: request.status,
                        server: server_status,
                    })
                }
                Err(refresh_error) => {
                    warn!(error = %refresh_error, "Refresh after refused transition failed");
                    self.set_record(Some(previous));
                    self.report_failure(
                        TransitionError::Refresh(refresh_error),
                        "refresh_from_server",
                    )
                    .await;
                    Err(TransitionError::Rejected(error))
                }
            };
        }

        warn!(
            delivery_id = %updated.id,
            attempts,
            error = %error,
            "Status update rejected, reverting"
        );
        self.set_record(Some(previous));
        let error = TransitionError::Rejected(error);
        self.report_failure(error.clone(), "update_status").await;
        Err(error)
    }

    /// Adopt the server's copy of the active delivery.
    pub async fn refresh_from_server(&self) -> Result<DeliveryTrackingRecord, TransitionError> {
        let _serial = self.transitions.lock().await;
        let current = self.current().ok_or(TransitionError::NoActiveDelivery)?;
        let server = match self.api.get_delivery(&current.id).await {
            Ok(server) => server,
            Err(e) => {
                let error = TransitionError::Refresh(e);
                self.report_failure(error.clone(), "refresh_from_server").await;
                return Err(error);
            }
        };

        self.set_record(Some(server.clone()));
        self.persist(&server).await?;
        Ok(server)
    }

    /// Apply an inbound real-time event. The server always wins.
    ///
    /// Events stamped before the local record's last change are stale
    /// echoes of replayed updates and are ignored. Returns true if the local
    /// record changed.
    pub async fn apply_remote_update(&self, event: &RealtimeEvent) -> Result<bool, TransitionError> {
        let RealtimeEvent::StatusUpdate {
            delivery_id,
            status,
            timestamp,
        } = event
        else {
            return Ok(false);
        };

        let _serial = self.transitions.lock().await;
        let Some(mut record) = self.current() else {
            return Ok(false);
        };
        if record.id != *delivery_id || record.status == *status {
            return Ok(false);
        }
        if *timestamp < record.updated_at {
            debug!(
                delivery_id = %record.id,
                status = %status,
                "Ignoring status update older than the local change"
            );
            return Ok(false);
        }

        info!(
            delivery_id = %record.id,
            from = %record.status,
            to = %status,
            "Applying server status update"
        );
        record.mark(*status, *timestamp);
        self.set_record(Some(record.clone()));
        self.persist(&record).await?;
        Ok(true)
    }

    /// Send a location sample for the active delivery, or queue it.
    pub async fn report_location(
        &self,
        sample: &LocationSample,
    ) -> Result<LocationReportOutcome, TransitionError> {
        let Some(record) = self.current() else {
            return Ok(LocationReportOutcome::Skipped);
        };
        if record.status.is_terminal() {
            return Ok(LocationReportOutcome::Skipped);
        }

        if !self.offline.is_offline() {
            let report = LocationReport::from(sample);
            match self.api.update_location(&record.id, &report).await {
                Ok(()) => {
                    let event = RealtimeEvent::LocationUpdate {
                        delivery_id: record.id.clone(),
                        location: report,
                        timestamp: sample.saved_at,
                    };
                    if let Err(e) = self.channel.emit(event).await {
                        warn!(error = %e, "Failed to emit location update");
                    }
                    return Ok(LocationReportOutcome::Sent);
                }
                Err(e) if !e.is_unreachable() => {
                    let error = TransitionError::Rejected(e);
                    self.report_failure(error.clone(), "update_location").await;
                    return Err(error);
                }
                Err(e) => debug!(error = %e, "Location upload failed, saving offline"),
            }
        }

        let raw = to_json(&sample.coordinate)?;
        self.offline
            .save_location_offline(&raw, Some(record.id.as_str()))
            .await?;
        Ok(LocationReportOutcome::Queued)
    }

    /// Apply server events from the real-time channel until shutdown.
    pub fn spawn_realtime_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let machine = Arc::clone(self);
        let mut rx = self.channel.subscribe();
        let cancel = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => {
                            if let Err(e) = machine.apply_remote_update(&event).await {
                                warn!(error = %e, "Failed to apply real-time update");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Real-time listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Real-time listener stopped");
        })
    }

    /// Cancel in-flight retries and stop the real-time listener.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn report_failure(&self, error: TransitionError, operation: &str) {
        if let Some(recovery) = &self.recovery {
            let context = ErrorContext::new().operation(operation);
            recovery.handle_error(Failure::from(error), context).await;
        }
    }

    fn set_record(&self, record: Option<DeliveryTrackingRecord>) {
        *self.record.write().unwrap() = record;
    }

    /// Write the active marker, or clear it once delivered.
    async fn persist(&self, record: &DeliveryTrackingRecord) -> Result<(), TransitionError> {
        if record.status.is_terminal() {
            self.hold.release();
            self.store.remove(keys::ACTIVE_DELIVERY).await?;
            info!(delivery_id = %record.id, "Delivery completed");
        } else {
            self.hold.acquire();
            save_json(self.store.as_ref(), keys::ACTIVE_DELIVERY, record).await?;
        }
        Ok(())
    }

    async fn announce_status(&self, record: &DeliveryTrackingRecord) {
        let event = RealtimeEvent::StatusUpdate {
            delivery_id: record.id.clone(),
            status: record.status,
            timestamp: record.updated_at,
        };
        if let Err(e) = self.channel.emit(event).await {
            warn!(error = %e, "Failed to emit status update");
        }
    }
}

impl std::fmt::Debug for DeliveryStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryStateMachine")
            .field("status", &self.status())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Encode {
        key: keys::ACTIVE_DELIVERY.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::{BoxFuture, FutureExt};
    use tokio::time::Instant;

    use crate::connectivity::ConnectivityMonitor;
    use crate::delivery::{BroadcastChannel, INVALID_STATUS_TRANSITION};
    use crate::notify::TracingPresenter;
    use crate::offline::OfflineQueueConfig;
    use crate::recovery::{ApiFailure, ErrorClass, RecoveryConfig};
    use crate::store::MemoryStore;

    // =========================================================================
    // Test Helpers
    // =========================================================================

    #[derive(Default)]
    struct MockApi {
        status_results: std::sync::Mutex<VecDeque<Result<(), DeliveryApiError>>>,
        status_calls: AtomicUsize,
        location_calls: AtomicUsize,
        location_result: std::sync::Mutex<Option<DeliveryApiError>>,
        server_record: std::sync::Mutex<Option<DeliveryTrackingRecord>>,
    }

    impl MockApi {
        fn script(&self, results: Vec<Result<(), DeliveryApiError>>) {
            *self.status_results.lock().unwrap() = results.into();
        }
    }

    impl DeliveryApi for MockApi {
        fn get_delivery<'a>(
            &'a self,
            id: &'a str,
        ) -> BoxFuture<'a, Result<DeliveryTrackingRecord, DeliveryApiError>> {
            let record = self.server_record.lock().unwrap().clone();
            async move {
                record.ok_or_else(|| DeliveryApiError::Rejected {
                    status: Some(404),
                    code: None,
                    message: format!("no delivery {id}"),
                })
            }
            .boxed()
        }

        fn update_status<'a>(
            &'a self,
            _id: &'a str,
            _request: &'a StatusUpdateRequest,
        ) -> BoxFuture<'a, Result<(), DeliveryApiError>> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let result = self
                .status_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()));
            async move { result }.boxed()
        }

        fn update_location<'a>(
            &'a self,
            _id: &'a str,
            _report: &'a LocationReport,
        ) -> BoxFuture<'a, Result<(), DeliveryApiError>> {
            self.location_calls.fetch_add(1, Ordering::SeqCst);
            let result = match self.location_result.lock().unwrap().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            };
            async move { result }.boxed()
        }
    }

    struct Harness {
        machine: Arc<DeliveryStateMachine>,
        api: Arc<MockApi>,
        channel: Arc<BroadcastChannel>,
        offline: Arc<OfflineQueue>,
        store: Arc<MemoryStore>,
        connectivity: Arc<ConnectivityMonitor>,
        hold: Arc<TracingHold>,
        recovery: Arc<ErrorRecoveryEngine>,
    }

    fn harness() -> Harness {
        let api = Arc::new(MockApi::default());
        let channel = Arc::new(BroadcastChannel::default());
        let store = Arc::new(MemoryStore::new());
        let connectivity = Arc::new(ConnectivityMonitor::new(true));
        let offline = Arc::new(OfflineQueue::new(
            store.clone(),
            connectivity.clone(),
            OfflineQueueConfig::default(),
        ));
        let hold = Arc::new(TracingHold::new());
        let recovery = Arc::new(ErrorRecoveryEngine::new(
            store.clone(),
            connectivity.clone(),
            Arc::new(TracingPresenter),
            offline.clone(),
            RecoveryConfig::default(),
        ));
        let machine = Arc::new(
            DeliveryStateMachine::new(
                api.clone(),
                channel.clone(),
                offline.clone(),
                store.clone(),
                DeliveryConfig::default(),
            )
            .with_activity_hold(hold.clone())
            .with_recovery(recovery.clone()),
        );
        Harness {
            machine,
            api,
            channel,
            offline,
            store,
            connectivity,
            hold,
            recovery,
        }
    }

    fn record_at(status: DeliveryStatus) -> DeliveryTrackingRecord {
        let mut record = DeliveryTrackingRecord::new("d-1").with_order("o-1");
        record.mark(status, Utc::now());
        record
    }

    fn unreachable() -> DeliveryApiError {
        DeliveryApiError::Unreachable("connection refused".into())
    }

    fn server_error() -> DeliveryApiError {
        DeliveryApiError::Rejected {
            status: Some(500),
            code: None,
            message: "internal error".into(),
        }
    }

    // =========================================================================
    // Table Validation
    // =========================================================================

    #[tokio::test]
    async fn test_skipping_states_is_rejected_without_side_effects() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::Assigned)).await.unwrap();
        let before = h.machine.current();

        let err = h
            .machine
            .transition_to(DeliveryStatus::PickedUp, None, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                from: DeliveryStatus::Assigned,
                to: DeliveryStatus::PickedUp
            }
        ));
        assert_eq!(h.machine.current(), before);
        assert_eq!(h.api.status_calls.load(Ordering::SeqCst), 0);
        assert!(h.offline.pending_actions().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_active_delivery() {
        let h = harness();
        let err = h.machine.advance(None, None).await.unwrap_err();
        assert!(matches!(err, TransitionError::NoActiveDelivery));
    }

    #[tokio::test]
    async fn test_advance_past_delivered() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::Delivered)).await.unwrap();
        let err = h.machine.advance(None, None).await.unwrap_err();
        assert!(matches!(
            err,
            TransitionError::AlreadyTerminal(DeliveryStatus::Delivered)
        ));
    }

    // =========================================================================
    // Confirmation
    // =========================================================================

    #[tokio::test]
    async fn test_confirmed_transition_emits_and_persists() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::Assigned)).await.unwrap();
        let mut events = h.channel.subscribe();

        let outcome = h.machine.advance(Some("on my way".into()), None).await.unwrap();

        assert_eq!(
            outcome,
            TransitionOutcome::Confirmed {
                status: DeliveryStatus::HeadingToPickup,
                attempts: 1
            }
        );
        assert_eq!(h.machine.status(), Some(DeliveryStatus::HeadingToPickup));
        match events.recv().await.unwrap() {
            RealtimeEvent::StatusUpdate { status, .. } => {
                assert_eq!(status, DeliveryStatus::HeadingToPickup)
            }
            other => panic!("unexpected event {other:?}"),
        }
        let marker = h.store.snapshot(keys::ACTIVE_DELIVERY).unwrap();
        assert_eq!(marker["status"], "heading_to_pickup");
        assert!(h.hold.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retry_with_linear_backoff() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::Assigned)).await.unwrap();
        h.api.script(vec![Err(server_error()), Err(server_error()), Ok(())]);
        let start = Instant::now();

        let outcome = h.machine.advance(None, None).await.unwrap();

        assert_eq!(
            outcome,
            TransitionOutcome::Confirmed {
                status: DeliveryStatus::HeadingToPickup,
                attempts: 3
            }
        );
        // 1 s after the first failure, 2 s after the second.
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_after_retries_reverts() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::AtPickup)).await.unwrap();
        h.api.script(vec![Err(server_error()); 3]);

        let err = h.machine.advance(None, None).await.unwrap_err();

        assert!(matches!(err, TransitionError::Rejected(_)));
        assert_eq!(h.api.status_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.machine.status(), Some(DeliveryStatus::AtPickup));
        assert!(h.offline.pending_actions().await.is_empty());

        let history = h.recovery.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].class, ErrorClass::Api(ApiFailure::Generic));
        assert_eq!(history[0].status, Some(500));
        assert_eq!(history[0].operation.as_deref(), Some("update_status"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_after_conflict_is_reported() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::Assigned)).await.unwrap();
        h.api.script(vec![Err(DeliveryApiError::Rejected {
            status: Some(409),
            code: None,
            message: "conflict".into(),
        })]);

        let err = h.machine.advance(None, None).await.unwrap_err();

        assert!(matches!(err, TransitionError::Rejected(_)));
        assert_eq!(h.machine.status(), Some(DeliveryStatus::Assigned));
        let history = h.recovery.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, Some(404));
        assert_eq!(history[0].operation.as_deref(), Some("refresh_from_server"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_transition_code_adopts_server_record() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::Assigned)).await.unwrap();
        h.api.script(vec![Err(DeliveryApiError::Rejected {
            status: Some(400),
            code: Some(INVALID_STATUS_TRANSITION.into()),
            message: "delivery was cancelled and reassigned".into(),
        })]);
        *h.api.server_record.lock().unwrap() = Some(record_at(DeliveryStatus::AtPickup));

        let err = h.machine.advance(None, None).await.unwrap_err();

        assert!(matches!(
            err,
            TransitionError::Resynced {
                requested: DeliveryStatus::HeadingToPickup,
                server: DeliveryStatus::AtPickup
            }
        ));
        assert_eq!(h.api.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.machine.status(), Some(DeliveryStatus::AtPickup));
    }

    // =========================================================================
    // Offline
    // =========================================================================

    #[tokio::test]
    async fn test_offline_transition_is_queued_without_calls() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::Assigned)).await.unwrap();
        h.connectivity.set_online(false);

        let location = Coordinate::new(18.47, -69.89).unwrap();
        let outcome = h
            .machine
            .advance(Some("left depot".into()), Some(location))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TransitionOutcome::Queued {
                status: DeliveryStatus::HeadingToPickup
            }
        );
        assert_eq!(h.api.status_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.machine.status(), Some(DeliveryStatus::HeadingToPickup));

        let pending = h.offline.pending_actions().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action_type, ActionType::StatusUpdate);
        assert_eq!(pending[0].payload["status"], "heading_to_pickup");

        let history = h.offline.status_history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].location, Some(location));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_server_queues_after_retries() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::Assigned)).await.unwrap();
        h.api.script(vec![Err(unreachable()); 3]);

        let outcome = h.machine.advance(None, None).await.unwrap();

        assert_eq!(
            outcome,
            TransitionOutcome::Queued {
                status: DeliveryStatus::HeadingToPickup
            }
        );
        assert_eq!(h.api.status_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.offline.pending_actions().await.len(), 1);
    }

    // =========================================================================
    // Completion
    // =========================================================================

    #[tokio::test]
    async fn test_delivered_releases_hold_and_clears_marker() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::AtDelivery)).await.unwrap();
        assert!(h.hold.is_held());
        assert!(h.store.contains(keys::ACTIVE_DELIVERY));

        h.machine.advance(None, None).await.unwrap();

        assert_eq!(h.machine.status(), Some(DeliveryStatus::Delivered));
        assert!(!h.hold.is_held());
        assert!(!h.store.contains(keys::ACTIVE_DELIVERY));
    }

    #[tokio::test]
    async fn test_restore_resumes_marker() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::PickedUp)).await.unwrap();

        let restored = DeliveryStateMachine::new(
            h.api.clone(),
            h.channel.clone(),
            h.offline.clone(),
            h.store.clone(),
            DeliveryConfig::default(),
        );
        let record = restored.restore().await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::PickedUp);
        assert_eq!(restored.status(), Some(DeliveryStatus::PickedUp));
    }

    // =========================================================================
    // Server Reconciliation
    // =========================================================================

    #[tokio::test]
    async fn test_remote_update_wins() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::Assigned)).await.unwrap();

        let event = RealtimeEvent::StatusUpdate {
            delivery_id: "d-1".into(),
            status: DeliveryStatus::AtPickup,
            timestamp: Utc::now(),
        };
        assert!(h.machine.apply_remote_update(&event).await.unwrap());
        assert_eq!(h.machine.status(), Some(DeliveryStatus::AtPickup));

        // Same status again, or another delivery, changes nothing.
        assert!(!h.machine.apply_remote_update(&event).await.unwrap());
        let other = RealtimeEvent::StatusUpdate {
            delivery_id: "d-2".into(),
            status: DeliveryStatus::Delivered,
            timestamp: Utc::now(),
        };
        assert!(!h.machine.apply_remote_update(&other).await.unwrap());
        assert_eq!(h.machine.status(), Some(DeliveryStatus::AtPickup));
    }

    #[tokio::test]
    async fn test_echo_older_than_local_change_is_ignored() {
        let h = harness();
        let earlier = Utc::now();
        h.machine.start(record_at(DeliveryStatus::AtPickup)).await.unwrap();

        let echo = RealtimeEvent::StatusUpdate {
            delivery_id: "d-1".into(),
            status: DeliveryStatus::HeadingToPickup,
            timestamp: earlier - chrono::Duration::seconds(1),
        };
        assert!(!h.machine.apply_remote_update(&echo).await.unwrap());
        assert_eq!(h.machine.status(), Some(DeliveryStatus::AtPickup));
    }

    #[tokio::test]
    async fn test_realtime_listener_applies_events() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::Assigned)).await.unwrap();
        let listener = h.machine.spawn_realtime_listener();

        h.channel
            .emit(RealtimeEvent::StatusUpdate {
                delivery_id: "d-1".into(),
                status: DeliveryStatus::PickedUp,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        for _ in 0..100 {
            if h.machine.status() == Some(DeliveryStatus::PickedUp) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(h.machine.status(), Some(DeliveryStatus::PickedUp));

        h.machine.shutdown();
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_from_server() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::Assigned)).await.unwrap();
        *h.api.server_record.lock().unwrap() = Some(record_at(DeliveryStatus::HeadingToPickup));

        let record = h.machine.refresh_from_server().await.unwrap();
        assert_eq!(record.status, DeliveryStatus::HeadingToPickup);
        assert_eq!(h.machine.status(), Some(DeliveryStatus::HeadingToPickup));
    }

    // =========================================================================
    // Location Reports
    // =========================================================================

    #[tokio::test]
    async fn test_location_report_falls_back_to_offline_history() {
        let h = harness();
        h.machine.start(record_at(DeliveryStatus::PickedUp)).await.unwrap();
        let sample = LocationSample::from_coordinate(Coordinate::new(18.47, -69.89).unwrap());

        assert_eq!(
            h.machine.report_location(&sample).await.unwrap(),
            LocationReportOutcome::Sent
        );

        *h.api.location_result.lock().unwrap() = Some(unreachable());
        assert_eq!(
            h.machine.report_location(&sample).await.unwrap(),
            LocationReportOutcome::Queued
        );
        assert_eq!(h.offline.location_history().await.len(), 1);
        let pending = h.offline.pending_actions().await;
        assert_eq!(pending[0].action_type, ActionType::LocationUpdate);
    }

    #[tokio::test]
    async fn test_location_report_without_delivery_is_skipped() {
        let h = harness();
        let sample = LocationSample::from_coordinate(Coordinate::new(18.47, -69.89).unwrap());
        assert_eq!(
            h.machine.report_location(&sample).await.unwrap(),
            LocationReportOutcome::Skipped
        );
        assert_eq!(h.api.location_calls.load(Ordering::SeqCst), 0);
    }
}
