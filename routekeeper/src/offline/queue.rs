//! The offline action queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::action::{
    ActionType, DeliverySnapshot, LocationUpdatePayload, OfflineLocation, PendingAction,
    StatusChange, DEFAULT_MAX_RETRIES,
};
use super::handler::{ActionError, ActionHandler};
use super::stats::{OfflineStats, SkipReason, SyncEvent, SyncReport};
use crate::busy::BusyFlag;
use crate::connectivity::ConnectivityObserver;
use crate::coord;
use crate::history::BoundedHistory;
use crate::store::{keys, load_json, save_json, KeyValueStore, StoreError};
use crate::time::is_older_than;

pub const DEFAULT_STATUS_HISTORY_CAPACITY: usize = 50;
pub const DEFAULT_LOCATION_HISTORY_CAPACITY: usize = 100;

/// Offline delivery snapshots older than this are purged on load.
pub const DEFAULT_DELIVERY_DATA_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const SYNC_EVENT_CAPACITY: usize = 32;

/// What one sync pass did with an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    Synced,
    Failed,
    Conflict,
    Deferred,
}

/// Fields of a delivery record that must hold valid coordinates.
const DELIVERY_COORDINATE_FIELDS: &[&str] = &["pickup_location", "delivery_location"];

#[derive(Debug, Clone)]
pub struct OfflineQueueConfig {
    pub max_retries: u32,
    pub status_history_capacity: usize,
    pub location_history_capacity: usize,
    pub delivery_data_max_age: Duration,
}

impl Default for OfflineQueueConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            status_history_capacity: DEFAULT_STATUS_HISTORY_CAPACITY,
            location_history_capacity: DEFAULT_LOCATION_HISTORY_CAPACITY,
            delivery_data_max_age: DEFAULT_DELIVERY_DATA_MAX_AGE,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum OfflineError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct QueueState {
    pending: Vec<PendingAction>,
    locations: BoundedHistory<OfflineLocation>,
    statuses: BoundedHistory<StatusChange>,
    delivery_data: Option<DeliverySnapshot>,
    last_sync: Option<DateTime<Utc>>,
}

impl QueueState {
    fn empty(config: &OfflineQueueConfig) -> Self {
        Self {
            pending: Vec::new(),
            locations: BoundedHistory::new(config.location_history_capacity),
            statuses: BoundedHistory::new(config.status_history_capacity),
            delivery_data: None,
            last_sync: None,
        }
    }
}

/// Durable queue of mutations made while the network was unavailable.
///
/// Every mutation persists the whole affected collection. Sync passes are
/// single-flight: a pass requested while another is running returns a
/// report skipped with [`SkipReason::AlreadySyncing`].
pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
    connectivity: Arc<dyn ConnectivityObserver>,
    config: OfflineQueueConfig,
    state: Mutex<QueueState>,
    handlers: RwLock<HashMap<ActionType, Arc<dyn ActionHandler>>>,
    sync_flag: BusyFlag,
    offline_mode: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
}

impl OfflineQueue {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        connectivity: Arc<dyn ConnectivityObserver>,
        config: OfflineQueueConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(SYNC_EVENT_CAPACITY);
        Self {
            store,
            connectivity,
            state: Mutex::new(QueueState::empty(&config)),
            config,
            handlers: RwLock::new(HashMap::new()),
            sync_flag: BusyFlag::new(),
            offline_mode: AtomicBool::new(false),
            events,
        }
    }

    /// Hydrate from the store, purging stale delivery data.
    pub async fn load(&self) -> Result<(), OfflineError> {
        let store = self.store.as_ref();

        let pending: Vec<PendingAction> =
            load_json(store, keys::PENDING_ACTIONS).await?.unwrap_or_default();
        let locations: Vec<OfflineLocation> = load_json(store, keys::LOCATION_HISTORY)
            .await?
            .unwrap_or_default();
        let statuses: Vec<StatusChange> =
            load_json(store, keys::STATUS_HISTORY).await?.unwrap_or_default();
        let mut delivery_data: Option<DeliverySnapshot> =
            load_json(store, keys::DELIVERY_DATA).await?;
        let last_sync: Option<DateTime<Utc>> = load_json(store, keys::LAST_SYNC).await?;

        if let Some(snapshot) = &delivery_data {
            if is_older_than(snapshot.saved_at, self.config.delivery_data_max_age) {
                tracing::info!(saved_at = %snapshot.saved_at, "Purging stale offline delivery data");
                store.remove(keys::DELIVERY_DATA).await?;
                delivery_data = None;
            }
        }

        let mut state = self.state.lock().await;
        *state = QueueState {
            pending,
            locations: BoundedHistory::from_entries(self.config.location_history_capacity, locations),
            statuses: BoundedHistory::from_entries(self.config.status_history_capacity, statuses),
            delivery_data,
            last_sync,
        };

        tracing::info!(
            pending = state.pending.len(),
            locations = state.locations.len(),
            statuses = state.statuses.len(),
            "Offline queue loaded"
        );
        Ok(())
    }

    /// Append an action and persist the queue.
    ///
    /// On a store failure the action stays queued in memory and the error is
    /// returned.
    pub async fn add_pending_action(
        &self,
        action_type: ActionType,
        payload: Value,
    ) -> Result<PendingAction, OfflineError> {
        let action = PendingAction::with_max_retries(action_type, payload, self.config.max_retries);

        let mut state = self.state.lock().await;
        state.pending.push(action.clone());
        tracing::debug!(
            action_id = %action.id,
            action_type = %action_type,
            queued = state.pending.len(),
            "Queued pending action"
        );
        save_json(self.store.as_ref(), keys::PENDING_ACTIONS, &state.pending).await?;
        Ok(action)
    }

    pub async fn pending_actions(&self) -> Vec<PendingAction> {
        self.state.lock().await.pending.clone()
    }

    /// Record a location taken while offline.
    ///
    /// With a `delivery_id` the location is also queued for upload.
    /// Invalid coordinates are discarded and `Ok(false)` returned.
    pub async fn save_location_offline(
        &self,
        raw: &Value,
        delivery_id: Option<&str>,
    ) -> Result<bool, OfflineError> {
        let Some(coordinate) = coord::normalize(raw) else {
            tracing::warn!(input = %raw, "Discarding invalid offline location");
            return Ok(false);
        };

        {
            let mut state = self.state.lock().await;
            state.locations.push(OfflineLocation {
                coordinate,
                delivery_id: delivery_id.map(str::to_string),
                saved_at: Utc::now(),
            });
            save_json(self.store.as_ref(), keys::LOCATION_HISTORY, &state.locations).await?;
        }

        if let Some(delivery_id) = delivery_id {
            let payload = LocationUpdatePayload::new(delivery_id, &coordinate);
            let payload = serde_json::to_value(payload).map_err(|e| StoreError::Encode {
                key: keys::PENDING_ACTIONS.to_string(),
                reason: e.to_string(),
            })?;
            self.add_pending_action(ActionType::LocationUpdate, payload)
                .await?;
        }
        Ok(true)
    }

    /// Record a status change in the offline history.
    ///
    /// Discards the entry (returning `Ok(false)`) when the id or status is
    /// blank or the attached location is not a valid coordinate.
    pub async fn save_status_change_offline(
        &self,
        delivery_id: &str,
        status: &str,
        notes: Option<&str>,
        location: Option<&Value>,
    ) -> Result<bool, OfflineError> {
        if delivery_id.trim().is_empty() || status.trim().is_empty() {
            tracing::warn!(delivery_id, status, "Discarding incomplete offline status change");
            return Ok(false);
        }

        let location = match location {
            None | Some(Value::Null) => None,
            Some(raw) => match coord::normalize(raw) {
                Some(coordinate) => Some(coordinate),
                None => {
                    tracing::warn!(
                        delivery_id,
                        status,
                        input = %raw,
                        "Discarding offline status change with invalid location"
                    );
                    return Ok(false);
                }
            },
        };

        let mut state = self.state.lock().await;
        state.statuses.push(StatusChange {
            delivery_id: delivery_id.to_string(),
            status: status.to_string(),
            notes: notes.map(str::to_string),
            location,
            recorded_at: Utc::now(),
        });
        save_json(self.store.as_ref(), keys::STATUS_HISTORY, &state.statuses).await?;
        Ok(true)
    }

    /// Keep a copy of the active delivery for offline use.
    ///
    /// The record must be a JSON object; coordinate fields, when present,
    /// must be valid or the snapshot is discarded.
    pub async fn save_delivery_data_offline(&self, record: &Value) -> Result<bool, OfflineError> {
        let Some(fields) = record.as_object() else {
            tracing::warn!("Discarding offline delivery data that is not an object");
            return Ok(false);
        };

        for field in DELIVERY_COORDINATE_FIELDS {
            match fields.get(*field) {
                None | Some(Value::Null) => {}
                Some(raw) if coord::is_valid(raw) => {}
                Some(raw) => {
                    tracing::warn!(field, input = %raw, "Discarding offline delivery data with invalid coordinates");
                    return Ok(false);
                }
            }
        }

        let snapshot = DeliverySnapshot {
            record: record.clone(),
            saved_at: Utc::now(),
        };
        let mut state = self.state.lock().await;
        save_json(self.store.as_ref(), keys::DELIVERY_DATA, &snapshot).await?;
        state.delivery_data = Some(snapshot);
        Ok(true)
    }

    pub async fn delivery_data(&self) -> Option<DeliverySnapshot> {
        self.state.lock().await.delivery_data.clone()
    }

    pub async fn status_history(&self) -> Vec<StatusChange> {
        self.state.lock().await.statuses.to_vec()
    }

    pub async fn location_history(&self) -> Vec<OfflineLocation> {
        self.state.lock().await.locations.to_vec()
    }

    pub async fn get_offline_stats(&self) -> OfflineStats {
        let state = self.state.lock().await;
        OfflineStats {
            pending_actions: state.pending.len(),
            location_history: state.locations.len(),
            status_history: state.statuses.len(),
            has_delivery_data: state.delivery_data.is_some(),
            is_online: self.connectivity.is_online(),
            offline_mode: self.is_offline_mode(),
            syncing: self.sync_flag.is_busy(),
            last_sync: state.last_sync,
        }
    }

    /// Route a handler for one action type, replacing any previous one.
    pub fn register_handler(&self, action_type: ActionType, handler: Arc<dyn ActionHandler>) {
        self.handlers
            .write()
            .unwrap()
            .insert(action_type, handler);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn enable_offline_mode(&self) {
        if !self.offline_mode.swap(true, Ordering::SeqCst) {
            tracing::info!("Offline mode enabled");
        }
    }

    pub fn disable_offline_mode(&self) {
        if self.offline_mode.swap(false, Ordering::SeqCst) {
            tracing::info!("Offline mode disabled");
        }
    }

    pub fn is_offline_mode(&self) -> bool {
        self.offline_mode.load(Ordering::SeqCst)
    }

    /// True when mutations should be queued instead of sent.
    pub fn is_offline(&self) -> bool {
        !self.connectivity.is_online() || self.is_offline_mode()
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_flag.is_busy()
    }

    /// Replay every queued action through its handler.
    ///
    /// Works on a snapshot of the queue so actions added during the pass are
    /// kept. Each failure bumps the action's retry count; actions reaching
    /// their limit are evicted and reported as permanently failed.
    ///
    /// Status updates for one delivery are replayed strictly in order: once
    /// one fails, later ones for the same delivery are deferred to the next
    /// pass untouched. A conflict evicts the refused update and every later
    /// one for that delivery.
    pub async fn sync_pending_data(&self) -> Result<SyncReport, OfflineError> {
        let Some(_guard) = self.sync_flag.try_acquire() else {
            tracing::debug!("Sync already in progress, skipping");
            let remaining = self.state.lock().await.pending.len();
            return Ok(SyncReport::skipped(SkipReason::AlreadySyncing, remaining));
        };

        if self.is_offline() {
            tracing::debug!("Offline, skipping sync");
            let remaining = self.state.lock().await.pending.len();
            return Ok(SyncReport::skipped(SkipReason::Offline, remaining));
        }

        let result = self.replay_pending().await;
        if let Err(OfflineError::Store(e)) = &result {
            let _ = self.events.send(SyncEvent::Failed {
                reason: e.to_string(),
                corrupted_key: e.corrupted_key().map(str::to_string),
            });
        }
        result
    }

    async fn replay_pending(&self) -> Result<SyncReport, OfflineError> {
        let snapshot = self.state.lock().await.pending.clone();
        let handlers = self.handlers.read().unwrap().clone();

        tracing::info!(pending = snapshot.len(), "Syncing pending actions");

        let mut outcomes: HashMap<Uuid, Replay> = HashMap::new();
        // Deliveries whose remaining status updates must not be sent this pass.
        let mut held: HashMap<String, Replay> = HashMap::new();
        let mut unhandled = 0;
        for action in &snapshot {
            if !self.connectivity.is_online() {
                tracing::info!("Connectivity lost during sync, stopping");
                break;
            }
            let delivery_id = action.status_delivery_id();
            if let Some(reason) = delivery_id.and_then(|id| held.get(id)) {
                let replay = match reason {
                    Replay::Conflict => Replay::Conflict,
                    _ => Replay::Deferred,
                };
                tracing::debug!(
                    action_id = %action.id,
                    delivery_id = ?delivery_id,
                    outcome = ?replay,
                    "Holding status update behind an earlier one"
                );
                outcomes.insert(action.id, replay);
                continue;
            }
            let Some(handler) = handlers.get(&action.action_type) else {
                tracing::warn!(action_type = %action.action_type, "No handler registered");
                unhandled += 1;
                continue;
            };
            let replay = match handler.handle(action).await {
                Ok(()) => {
                    tracing::debug!(action_id = %action.id, "Pending action synced");
                    Replay::Synced
                }
                Err(ActionError::Conflict(reason)) => {
                    tracing::warn!(
                        action_id = %action.id,
                        delivery_id = ?delivery_id,
                        reason = %reason,
                        "Pending action conflicts with the server"
                    );
                    Replay::Conflict
                }
                Err(e) => {
                    tracing::warn!(
                        action_id = %action.id,
                        action_type = %action.action_type,
                        retry_count = action.retry_count,
                        error = %e,
                        "Pending action failed"
                    );
                    Replay::Failed
                }
            };
            if let Some(id) = delivery_id {
                if replay != Replay::Synced {
                    held.insert(id.to_string(), replay);
                }
            }
            outcomes.insert(action.id, replay);
        }

        let mut report = SyncReport {
            unhandled,
            ..Default::default()
        };
        let now = Utc::now();
        {
            let mut state = self.state.lock().await;
            for mut action in std::mem::take(&mut state.pending) {
                match outcomes.get(&action.id) {
                    Some(Replay::Synced) => report.synced += 1,
                    Some(Replay::Conflict) => report.conflicted.push(action),
                    Some(Replay::Failed) => {
                        if action.record_failure() {
                            report.permanently_failed.push(action);
                        } else {
                            report.failed += 1;
                            state.pending.push(action);
                        }
                    }
                    Some(Replay::Deferred) => {
                        report.deferred += 1;
                        state.pending.push(action);
                    }
                    None => state.pending.push(action),
                }
            }
            report.remaining = state.pending.len();
            state.last_sync = Some(now);

            save_json(self.store.as_ref(), keys::PENDING_ACTIONS, &state.pending).await?;
            save_json(self.store.as_ref(), keys::LAST_SYNC, &now).await?;
        }

        for action in &report.permanently_failed {
            tracing::error!(
                action_id = %action.id,
                action_type = %action.action_type,
                retries = action.retry_count,
                "Pending action permanently failed, dropped from queue"
            );
            let _ = self.events.send(SyncEvent::PermanentlyFailed(action.clone()));
        }
        for action in &report.conflicted {
            let _ = self.events.send(SyncEvent::Conflict(action.clone()));
        }
        let _ = self.events.send(SyncEvent::Completed {
            synced: report.synced,
            failed: report.failed,
            remaining: report.remaining,
        });

        tracing::info!(
            synced = report.synced,
            failed = report.failed,
            conflicted = report.conflicted.len(),
            deferred = report.deferred,
            dropped = report.permanently_failed.len(),
            remaining = report.remaining,
            "Sync complete"
        );
        Ok(report)
    }

    /// Clear and reinitialize all offline state, in memory and in the store.
    pub async fn reset(&self) -> Result<(), OfflineError> {
        let mut state = self.state.lock().await;
        *state = QueueState::empty(&self.config);
        for key in keys::OFFLINE_KEYS {
            self.store.remove(key).await?;
        }
        self.offline_mode.store(false, Ordering::SeqCst);
        tracing::info!("Offline state reset");
        Ok(())
    }

    /// Sync whenever connectivity goes from offline to online.
    ///
    /// Coming back online also leaves offline mode.
    pub fn spawn_reconnect_listener(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        let mut rx = self.connectivity.subscribe();

        tokio::spawn(async move {
            let mut was_online = *rx.borrow_and_update();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let online = *rx.borrow_and_update();
                if online && !was_online {
                    tracing::info!("Back online, syncing pending actions");
                    queue.disable_offline_mode();
                    // Failures are also published as `SyncEvent::Failed`.
                    if let Err(e) = queue.sync_pending_data().await {
                        tracing::warn!(error = %e, "Reconnect sync failed");
                    }
                }
                was_online = online;
            }
            tracing::debug!("Reconnect listener stopped");
        })
    }
}
