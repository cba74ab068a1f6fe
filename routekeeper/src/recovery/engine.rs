//! The error recovery engine.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::classify::{classify, ApiFailure, ErrorClass};
use super::failure::{ErrorContext, Failure, ServiceHint};
use super::repair::{plan_repair, RepairPlan};
use super::strategy::StrategyRecord;
use crate::busy::BusyFlag;
use crate::connectivity::ConnectivityObserver;
use crate::coord::{Coordinate, DEFAULT_REGION_CENTER};
use crate::history::BoundedHistory;
use crate::location::{LocationError, LocationSample, LocationService};
use crate::notify::{Notice, NoticeAction, Presenter};
use crate::offline::OfflineQueue;
use crate::store::{keys, load_json, KeyValueStore};
use crate::viewport::Viewport;

pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(10);
pub const DEFAULT_ERROR_HISTORY_CAPACITY: usize = 50;

const RECOVERY_EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub rate_limit_wait: Duration,
    pub history_capacity: usize,
    /// Used by location recovery when nothing was ever persisted.
    pub default_location: Option<Coordinate>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            rate_limit_wait: DEFAULT_RATE_LIMIT_WAIT,
            history_capacity: DEFAULT_ERROR_HISTORY_CAPACITY,
            default_location: Some(DEFAULT_REGION_CENTER),
        }
    }
}

/// Obtains a fresh credential after an auth failure.
pub trait CredentialRefresher: Send + Sync {
    fn refresh(&self) -> BoxFuture<'_, Result<(), Failure>>;
}

/// One handled failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub class: ErrorClass,
    pub message: String,
    pub status: Option<u16>,
    pub service: Option<ServiceHint>,
    pub operation: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Recovery attempts made for this failure. Zero while recovery runs.
    pub retry_count: u32,
}

/// How a recovery succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    OfflineMode,
    Retried,
    LastKnownLocation(LocationSample),
    DefaultLocation(Coordinate),
    Repaired { key: String, dropped: usize },
    AlreadyIntact { key: String },
    Deleted { key: String },
    CredentialRefreshed,
    RateLimitElapsed,
    ServedFromCache(Value),
    ViewportReset,
    OfflineStateReset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    Recovered {
        class: ErrorClass,
        attempts: u32,
        resolution: Resolution,
    },
    /// Strategies were exhausted; the permanent fallback ran.
    Failed { class: ErrorClass, attempts: u32 },
    /// Another recovery run was in flight.
    AlreadyRecovering,
    /// Non-critical failure, logged only.
    NotAttempted { class: ErrorClass },
}

impl RecoveryOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered { .. })
    }
}

/// Announcements for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryEvent {
    /// Reset the map to this simplified viewport.
    ResetViewport(Viewport),
    OfflineModeEnabled,
    /// Location is approximate until a live fix arrives.
    ApproximateLocation,
    /// Replace the map with text directions.
    TextDirections,
    Recovered(ErrorClass),
    RecoveryFailed(ErrorClass),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryStats {
    pub total: usize,
    pub by_class: BTreeMap<&'static str, usize>,
    pub recovering: bool,
}

#[derive(Debug, Error)]
enum StrategyError {
    /// The strategy has nothing to work with; retrying cannot help.
    #[error("{0}")]
    Unavailable(&'static str),

    #[error("{0}")]
    Failed(String),
}

/// Classifies failures and runs bounded, class-specific recovery.
///
/// Only one recovery runs at a time; a concurrent request gets
/// [`RecoveryOutcome::AlreadyRecovering`]. Exhaustion always ends with a
/// user notice.
pub struct ErrorRecoveryEngine {
    store: Arc<dyn KeyValueStore>,
    connectivity: Arc<dyn ConnectivityObserver>,
    presenter: Arc<dyn Presenter>,
    offline: Arc<OfflineQueue>,
    location: Option<Arc<LocationService>>,
    credentials: Option<Arc<dyn CredentialRefresher>>,
    config: RecoveryConfig,
    history: Mutex<BoundedHistory<ErrorRecord>>,
    in_flight: BusyFlag,
    events: broadcast::Sender<RecoveryEvent>,
    shutdown: CancellationToken,
}

impl ErrorRecoveryEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        connectivity: Arc<dyn ConnectivityObserver>,
        presenter: Arc<dyn Presenter>,
        offline: Arc<OfflineQueue>,
        config: RecoveryConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(RECOVERY_EVENT_CAPACITY);
        Self {
            store,
            connectivity,
            presenter,
            offline,
            location: None,
            credentials: None,
            history: Mutex::new(BoundedHistory::new(config.history_capacity)),
            config,
            in_flight: BusyFlag::new(),
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// Resolve location failures through `location` instead of the raw store.
    pub fn with_location_service(mut self, location: Arc<LocationService>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_credential_refresher(mut self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.credentials = Some(refresher);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.events.subscribe()
    }

    pub fn is_recovering(&self) -> bool {
        self.in_flight.is_busy()
    }

    /// Classify and record a failure, recovering from critical classes.
    ///
    /// The failure is in [`history`](Self::history) before recovery starts;
    /// its `retry_count` is filled in once recovery ends.
    pub async fn handle_error(&self, failure: Failure, context: ErrorContext) -> RecoveryOutcome {
        let class = classify(&failure, &context);
        let record_id = self.record(class, &failure, &context);

        if !class.is_critical() {
            tracing::warn!(
                class = %class,
                operation = ?context.operation,
                error = %failure,
                "Non-critical failure"
            );
            return RecoveryOutcome::NotAttempted { class };
        }

        tracing::error!(
            class = %class,
            operation = ?context.operation,
            error = %failure,
            "Critical failure, attempting recovery"
        );
        let outcome = self.attempt_recovery(class, &context).await;
        if let RecoveryOutcome::Recovered { attempts, .. } | RecoveryOutcome::Failed { attempts, .. } =
            &outcome
        {
            self.set_retry_count(record_id, *attempts);
        }
        outcome
    }

    /// Run the strategy for `class` within its retry budget.
    pub async fn attempt_recovery(&self, class: ErrorClass, context: &ErrorContext) -> RecoveryOutcome {
        let Some(_guard) = self.in_flight.try_acquire() else {
            tracing::debug!(class = %class, "Recovery already in progress");
            return RecoveryOutcome::AlreadyRecovering;
        };

        let strategy = StrategyRecord::for_class(class);
        let result = strategy
            .retry_policy()
            .run_while(
                &self.shutdown,
                |attempt| {
                    tracing::debug!(class = %class, attempt, "Recovery attempt");
                    self.run_strategy(class, context)
                },
                |e| !matches!(e, StrategyError::Unavailable(_)),
            )
            .await;

        match result {
            Ok((resolution, attempts)) => {
                tracing::info!(class = %class, attempts, resolution = ?resolution, "Recovered");
                let _ = self.events.send(RecoveryEvent::Recovered(class));
                RecoveryOutcome::Recovered {
                    class,
                    attempts,
                    resolution,
                }
            }
            Err(e) => {
                let attempts = e.attempts();
                tracing::warn!(
                    class = %class,
                    attempts,
                    error = ?e.last_error().map(ToString::to_string),
                    "Recovery exhausted"
                );
                self.handle_recovery_failure(class);
                RecoveryOutcome::Failed { class, attempts }
            }
        }
    }

    async fn run_strategy(
        &self,
        class: ErrorClass,
        context: &ErrorContext,
    ) -> Result<Resolution, StrategyError> {
        match class {
            ErrorClass::Network => self.recover_network(context).await,
            ErrorClass::Location => self.recover_location().await,
            ErrorClass::DataCorruption => self.recover_corruption(context).await,
            ErrorClass::Api(ApiFailure::Auth) => self.recover_auth().await,
            ErrorClass::Api(ApiFailure::RateLimit) => self.recover_rate_limit().await,
            ErrorClass::Api(ApiFailure::Generic) => self.recover_from_cache(context).await,
            ErrorClass::Map => {
                let _ = self
                    .events
                    .send(RecoveryEvent::ResetViewport(Viewport::simplified_default()));
                Ok(Resolution::ViewportReset)
            }
            ErrorClass::Sync => self
                .offline
                .reset()
                .await
                .map(|_| Resolution::OfflineStateReset)
                .map_err(|e| StrategyError::Failed(e.to_string())),
            ErrorClass::Unknown => Err(StrategyError::Unavailable("no strategy for unknown errors")),
        }
    }

    async fn recover_network(&self, context: &ErrorContext) -> Result<Resolution, StrategyError> {
        if !self.connectivity.is_online() {
            self.offline.enable_offline_mode();
            let _ = self.events.send(RecoveryEvent::OfflineModeEnabled);
            return Ok(Resolution::OfflineMode);
        }
        let Some(retry) = &context.retry else {
            return Err(StrategyError::Unavailable("no operation to retry"));
        };
        retry()
            .await
            .map(|_| Resolution::Retried)
            .map_err(|e| StrategyError::Failed(e.to_string()))
    }

    async fn recover_location(&self) -> Result<Resolution, StrategyError> {
        let last_known = match &self.location {
            Some(location) => location.last_known_location().await,
            None => load_json::<LocationSample>(self.store.as_ref(), keys::LAST_KNOWN_LOCATION)
                .await
                .map_err(LocationError::from),
        };
        match last_known {
            Ok(Some(sample)) => return Ok(Resolution::LastKnownLocation(sample)),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Last known location unreadable"),
        }
        self.location
            .as_ref()
            .and_then(|location| location.default_location())
            .or(self.config.default_location)
            .map(Resolution::DefaultLocation)
            .ok_or(StrategyError::Unavailable("no last known or default location"))
    }

    async fn recover_corruption(&self, context: &ErrorContext) -> Result<Resolution, StrategyError> {
        let Some(key) = context.storage_key.clone() else {
            return Err(StrategyError::Unavailable("no storage key to repair"));
        };

        let store_err = |e: crate::store::StoreError| StrategyError::Failed(e.to_string());
        let Some(value) = self.store.get(&key).await.map_err(store_err)? else {
            return Ok(Resolution::AlreadyIntact { key });
        };

        match plan_repair(&key, &value) {
            RepairPlan::Intact => Ok(Resolution::AlreadyIntact { key }),
            RepairPlan::Replace { value, dropped } => {
                self.store.set(&key, value).await.map_err(store_err)?;
                tracing::info!(key = %key, dropped, "Repaired stored value");
                Ok(Resolution::Repaired { key, dropped })
            }
            RepairPlan::Delete => {
                self.store.remove(&key).await.map_err(store_err)?;
                tracing::warn!(key = %key, "Deleted unrepairable stored value");
                Ok(Resolution::Deleted { key })
            }
        }
    }

    async fn recover_auth(&self) -> Result<Resolution, StrategyError> {
        let Some(refresher) = &self.credentials else {
            return Err(StrategyError::Unavailable("no credential refresher"));
        };
        refresher
            .refresh()
            .await
            .map(|_| Resolution::CredentialRefreshed)
            .map_err(|e| StrategyError::Failed(e.to_string()))
    }

    async fn recover_rate_limit(&self) -> Result<Resolution, StrategyError> {
        tracing::info!(
            wait_secs = self.config.rate_limit_wait.as_secs(),
            "Rate limited, waiting"
        );
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(StrategyError::Failed("shut down".to_string())),
            _ = tokio::time::sleep(self.config.rate_limit_wait) => Ok(Resolution::RateLimitElapsed),
        }
    }

    async fn recover_from_cache(&self, context: &ErrorContext) -> Result<Resolution, StrategyError> {
        let Some(key) = &context.cache_key else {
            return Err(StrategyError::Unavailable("no cache key"));
        };
        match self.store.get(key).await {
            Ok(Some(value)) if !value.is_null() => Ok(Resolution::ServedFromCache(value)),
            Ok(_) => Err(StrategyError::Unavailable("no cached copy")),
            Err(e) => Err(StrategyError::Failed(e.to_string())),
        }
    }

    /// Permanent fallback once recovery is exhausted. Always tells the user.
    pub fn handle_recovery_failure(&self, class: ErrorClass) {
        let notice = match class {
            ErrorClass::Network => {
                self.offline.enable_offline_mode();
                let _ = self.events.send(RecoveryEvent::OfflineModeEnabled);
                Notice::new(
                    "Working offline",
                    "The connection could not be restored. Changes are saved and will sync when you are back online.",
                )
                .with_actions(vec![NoticeAction::ContinueOffline, NoticeAction::Retry])
            }
            ErrorClass::Location => {
                let _ = self.events.send(RecoveryEvent::ApproximateLocation);
                Notice::new(
                    "Approximate location",
                    "Your exact position is unavailable. An approximate location is being used.",
                )
                .with_actions(vec![NoticeAction::Retry, NoticeAction::OpenSettings])
            }
            ErrorClass::Map => {
                let _ = self.events.send(RecoveryEvent::TextDirections);
                Notice::new(
                    "Map unavailable",
                    "The map could not be loaded. Showing text directions instead.",
                )
            }
            ErrorClass::DataCorruption => Notice::new(
                "Saved data damaged",
                "Some saved data could not be recovered and may need to be re-entered.",
            ),
            ErrorClass::Api(ApiFailure::Auth) => Notice::new(
                "Session expired",
                "Please sign in again to continue.",
            ),
            ErrorClass::Api(_) => Notice::new(
                "Service unavailable",
                "The delivery service is not responding. Please try again shortly.",
            )
            .with_actions(vec![NoticeAction::Retry, NoticeAction::Dismiss]),
            ErrorClass::Sync => Notice::new(
                "Sync failed",
                "Offline changes could not be synchronized.",
            )
            .with_actions(vec![NoticeAction::Retry, NoticeAction::Dismiss]),
            ErrorClass::Unknown => Notice::new(
                "Something went wrong",
                "An unexpected error occurred.",
            ),
        };

        let _ = self.events.send(RecoveryEvent::RecoveryFailed(class));
        self.presenter.notify(notice);
    }

    fn record(&self, class: ErrorClass, failure: &Failure, context: &ErrorContext) -> Uuid {
        let id = Uuid::new_v4();
        self.history.lock().unwrap().push(ErrorRecord {
            id,
            class,
            message: failure.message.clone(),
            status: failure.status,
            service: context.service,
            operation: context.operation.clone(),
            timestamp: Utc::now(),
            retry_count: 0,
        });
        id
    }

    fn set_retry_count(&self, id: Uuid, retry_count: u32) {
        let mut history = self.history.lock().unwrap();
        // The record may already have been evicted by newer failures.
        if let Some(record) = history.iter_mut().find(|r| r.id == id) {
            record.retry_count = retry_count;
        };
    }

    /// Handled failures, oldest first.
    pub fn history(&self) -> Vec<ErrorRecord> {
        self.history.lock().unwrap().to_vec()
    }

    pub fn clear_history(&self) {
        self.history.lock().unwrap().clear();
    }

    pub fn stats(&self) -> RecoveryStats {
        let history = self.history.lock().unwrap();
        let mut by_class = BTreeMap::new();
        for record in history.iter() {
            *by_class.entry(record.class.name()).or_insert(0) += 1;
        }
        RecoveryStats {
            total: history.len(),
            by_class,
            recovering: self.in_flight.is_busy(),
        }
    }

    /// Abort in-flight backoff waits.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityMonitor;
    use crate::location::{
        FixStream, LocationProvider, LocationServiceConfig, PermissionStatus, PositionOptions,
        ProviderError, RawFix,
    };
    use crate::recovery::RetryOperation;
    use crate::offline::{ActionType, OfflineQueueConfig, PendingAction};
    use crate::store::{save_json, MemoryStore};
    use futures::future::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::{mpsc, Notify};

    // ========================================================================
    // Test Helpers
    // ========================================================================

    #[derive(Default)]
    struct RecordingPresenter {
        notices: Mutex<Vec<Notice>>,
    }

    impl Presenter for RecordingPresenter {
        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        monitor: Arc<ConnectivityMonitor>,
        presenter: Arc<RecordingPresenter>,
        offline: Arc<OfflineQueue>,
        engine: Arc<ErrorRecoveryEngine>,
    }

    fn fixture(online: bool) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let monitor = Arc::new(ConnectivityMonitor::new(online));
        let presenter = Arc::new(RecordingPresenter::default());
        let offline = Arc::new(OfflineQueue::new(
            store.clone(),
            monitor.clone(),
            OfflineQueueConfig::default(),
        ));
        let engine = Arc::new(ErrorRecoveryEngine::new(
            store.clone(),
            monitor.clone(),
            presenter.clone(),
            offline.clone(),
            RecoveryConfig::default(),
        ));
        Fixture {
            store,
            monitor,
            presenter,
            offline,
            engine,
        }
    }

    struct CountingRefresher {
        calls: AtomicU32,
    }

    impl CredentialRefresher for CountingRefresher {
        fn refresh(&self) -> BoxFuture<'_, Result<(), Failure>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }.boxed()
        }
    }

    struct NoFixProvider;

    impl LocationProvider for NoFixProvider {
        fn request_permission(&self) -> BoxFuture<'_, PermissionStatus> {
            async { PermissionStatus::Granted }.boxed()
        }

        fn current_position(
            &self,
            _options: PositionOptions,
        ) -> BoxFuture<'_, Result<RawFix, ProviderError>> {
            async { Err(ProviderError::Timeout) }.boxed()
        }

        fn watch_position(&self, _options: PositionOptions) -> Result<FixStream, ProviderError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    // ========================================================================
    // Rate limiting
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_then_succeeds() {
        let f = fixture(true);
        let failure = Failure::new("Too Many Requests").with_status(429);
        let context = ErrorContext::new();
        let class = classify(&failure, &context);
        assert_eq!(class, ErrorClass::Api(ApiFailure::RateLimit));

        let started = tokio::time::Instant::now();
        let outcome = f.engine.attempt_recovery(class, &context).await;

        assert_eq!(
            outcome,
            RecoveryOutcome::Recovered {
                class,
                attempts: 1,
                resolution: Resolution::RateLimitElapsed
            }
        );
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(10));
        assert!(waited < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_recovery_is_refused() {
        let f = fixture(true);
        let running = {
            let engine = Arc::clone(&f.engine);
            tokio::spawn(async move {
                engine
                    .attempt_recovery(ErrorClass::Api(ApiFailure::RateLimit), &ErrorContext::new())
                    .await
            })
        };
        while !f.engine.is_recovering() {
            tokio::task::yield_now().await;
        }

        let second = f
            .engine
            .attempt_recovery(ErrorClass::Map, &ErrorContext::new())
            .await;
        assert_eq!(second, RecoveryOutcome::AlreadyRecovering);

        assert!(running.await.unwrap().is_recovered());
        assert!(!f.engine.is_recovering());
    }

    // ========================================================================
    // Network
    // ========================================================================

    #[tokio::test]
    async fn test_network_offline_enables_offline_mode() {
        let f = fixture(false);
        let outcome = f
            .engine
            .handle_error(Failure::new("Network request failed"), ErrorContext::new())
            .await;

        assert!(matches!(
            outcome,
            RecoveryOutcome::Recovered {
                resolution: Resolution::OfflineMode,
                ..
            }
        ));
        assert!(f.offline.is_offline_mode());
        assert_eq!(f.engine.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_online_retries_failed_operation() {
        let f = fixture(true);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let retry: RetryOperation = Arc::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 2 {
                    Err(Failure::new("connection reset"))
                } else {
                    Ok(())
                }
            }
            .boxed()
        });

        let outcome = f
            .engine
            .handle_error(
                Failure::new("connection reset"),
                ErrorContext::new().operation("update_status").retry(retry),
            )
            .await;

        assert_eq!(
            outcome,
            RecoveryOutcome::Recovered {
                class: ErrorClass::Network,
                attempts: 2,
                resolution: Resolution::Retried
            }
        );
        assert_eq!(f.engine.history()[0].retry_count, 2);
    }

    #[tokio::test]
    async fn test_exhausted_network_recovery_falls_back_and_notifies() {
        let f = fixture(true);
        let mut events = f.engine.subscribe();

        let outcome = f
            .engine
            .handle_error(Failure::new("Network request failed"), ErrorContext::new())
            .await;

        assert!(matches!(outcome, RecoveryOutcome::Failed { class: ErrorClass::Network, .. }));
        assert!(f.offline.is_offline_mode());
        let notices = f.presenter.notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].title, "Working offline");

        let mut saw_failed = false;
        while let Ok(event) = events.try_recv() {
            if event == RecoveryEvent::RecoveryFailed(ErrorClass::Network) {
                saw_failed = true;
            }
        }
        assert!(saw_failed);
    }

    // ========================================================================
    // Location
    // ========================================================================

    #[tokio::test]
    async fn test_location_prefers_last_known() {
        let f = fixture(true);
        let sample = LocationSample::from_fix(&RawFix::new(19.45, -70.69)).unwrap();
        save_json(f.store.as_ref(), keys::LAST_KNOWN_LOCATION, &sample)
            .await
            .unwrap();

        let outcome = f
            .engine
            .attempt_recovery(ErrorClass::Location, &ErrorContext::new())
            .await;
        assert_eq!(
            outcome,
            RecoveryOutcome::Recovered {
                class: ErrorClass::Location,
                attempts: 1,
                resolution: Resolution::LastKnownLocation(sample)
            }
        );
    }

    #[tokio::test]
    async fn test_location_falls_back_to_default() {
        let f = fixture(true);
        let outcome = f
            .engine
            .attempt_recovery(ErrorClass::Location, &ErrorContext::new())
            .await;
        assert!(matches!(
            outcome,
            RecoveryOutcome::Recovered {
                resolution: Resolution::DefaultLocation(c),
                ..
            } if c == DEFAULT_REGION_CENTER
        ));
    }

    #[tokio::test]
    async fn test_location_recovery_goes_through_location_service() {
        let f = fixture(true);
        let service_default = Coordinate::new(19.45, -70.69).unwrap();
        let location = Arc::new(LocationService::new(
            Arc::new(NoFixProvider),
            f.store.clone(),
            f.presenter.clone(),
            LocationServiceConfig {
                default_location: Some(service_default),
                ..Default::default()
            },
        ));
        let engine = ErrorRecoveryEngine::new(
            f.store.clone(),
            f.monitor.clone(),
            f.presenter.clone(),
            f.offline.clone(),
            RecoveryConfig::default(),
        )
        .with_location_service(location);

        let outcome = engine
            .handle_error(
                LocationError::from(ProviderError::Timeout).into(),
                ErrorContext::new(),
            )
            .await;

        assert_eq!(
            outcome,
            RecoveryOutcome::Recovered {
                class: ErrorClass::Location,
                attempts: 1,
                resolution: Resolution::DefaultLocation(service_default)
            }
        );
    }

    // ========================================================================
    // Data corruption
    // ========================================================================

    #[tokio::test]
    async fn test_corrupt_list_is_repaired() {
        let f = fixture(true);
        let good = serde_json::to_value(PendingAction::new(ActionType::StatusUpdate, json!({})))
            .unwrap();
        f.store
            .set(keys::PENDING_ACTIONS, json!([good, "junk"]))
            .await
            .unwrap();

        let outcome = f
            .engine
            .handle_error(
                Failure::new("JSON Parse error"),
                ErrorContext::new().storage_key(keys::PENDING_ACTIONS),
            )
            .await;

        assert!(matches!(
            outcome,
            RecoveryOutcome::Recovered {
                resolution: Resolution::Repaired { dropped: 1, .. },
                ..
            }
        ));
        f.offline.load().await.unwrap();
        assert_eq!(f.offline.pending_actions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unrepairable_value_is_deleted() {
        let f = fixture(true);
        f.store
            .set(keys::LAST_KNOWN_LOCATION, json!("{{{"))
            .await
            .unwrap();

        let outcome = f
            .engine
            .attempt_recovery(
                ErrorClass::DataCorruption,
                &ErrorContext::new().storage_key(keys::LAST_KNOWN_LOCATION),
            )
            .await;

        assert!(matches!(
            outcome,
            RecoveryOutcome::Recovered {
                resolution: Resolution::Deleted { .. },
                ..
            }
        ));
        assert!(!f.store.contains(keys::LAST_KNOWN_LOCATION));
    }

    #[tokio::test]
    async fn test_corruption_without_key_fails_immediately() {
        let f = fixture(true);
        let outcome = f
            .engine
            .attempt_recovery(ErrorClass::DataCorruption, &ErrorContext::new())
            .await;
        assert_eq!(
            outcome,
            RecoveryOutcome::Failed {
                class: ErrorClass::DataCorruption,
                attempts: 1
            }
        );
        assert_eq!(f.presenter.notices.lock().unwrap().len(), 1);
    }

    // ========================================================================
    // API, map, sync
    // ========================================================================

    #[tokio::test]
    async fn test_auth_refreshes_credentials() {
        let f = fixture(true);
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicU32::new(0),
        });
        let engine = ErrorRecoveryEngine::new(
            f.store.clone(),
            f.monitor.clone(),
            f.presenter.clone(),
            f.offline.clone(),
            RecoveryConfig::default(),
        )
        .with_credential_refresher(refresher.clone());

        let outcome = engine
            .attempt_recovery(ErrorClass::Api(ApiFailure::Auth), &ErrorContext::new())
            .await;
        assert!(outcome.is_recovered());
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generic_api_failure_serves_cache() {
        let f = fixture(true);
        f.store
            .set("cache.delivery.d-1", json!({ "id": "d-1" }))
            .await
            .unwrap();

        let outcome = f
            .engine
            .attempt_recovery(
                ErrorClass::Api(ApiFailure::Generic),
                &ErrorContext::new().cache_key("cache.delivery.d-1"),
            )
            .await;
        assert!(matches!(
            outcome,
            RecoveryOutcome::Recovered {
                resolution: Resolution::ServedFromCache(ref v),
                ..
            } if v["id"] == "d-1"
        ));
    }

    #[tokio::test]
    async fn test_map_failure_publishes_viewport_reset() {
        let f = fixture(true);
        let mut events = f.engine.subscribe();

        let outcome = f
            .engine
            .handle_error(Failure::new("Map tiles failed"), ErrorContext::new())
            .await;
        assert!(outcome.is_recovered());
        assert_eq!(
            events.recv().await.unwrap(),
            RecoveryEvent::ResetViewport(Viewport::simplified_default())
        );
    }

    #[tokio::test]
    async fn test_sync_recovery_resets_offline_state() {
        let f = fixture(true);
        f.offline
            .add_pending_action(ActionType::StatusUpdate, json!({}))
            .await
            .unwrap();

        let outcome = f
            .engine
            .attempt_recovery(ErrorClass::Sync, &ErrorContext::new())
            .await;
        assert!(outcome.is_recovered());
        assert!(f.offline.pending_actions().await.is_empty());
    }

    // ========================================================================
    // History
    // ========================================================================

    #[tokio::test]
    async fn test_non_critical_failures_are_only_recorded() {
        let f = fixture(true);
        f.offline
            .add_pending_action(ActionType::StatusUpdate, json!({}))
            .await
            .unwrap();

        let outcome = f
            .engine
            .handle_error(Failure::new("sync pass aborted"), ErrorContext::new())
            .await;
        assert_eq!(
            outcome,
            RecoveryOutcome::NotAttempted {
                class: ErrorClass::Sync
            }
        );
        // No reset happened.
        assert_eq!(f.offline.pending_actions().await.len(), 1);
        assert_eq!(f.engine.stats().by_class.get("sync"), Some(&1));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_before_recovery_finishes() {
        let f = fixture(true);
        let gate = Arc::new(Notify::new());
        let waiter = Arc::clone(&gate);
        let retry: RetryOperation = Arc::new(move || {
            let waiter = Arc::clone(&waiter);
            async move {
                waiter.notified().await;
                Ok(())
            }
            .boxed()
        });

        let running = {
            let engine = Arc::clone(&f.engine);
            tokio::spawn(async move {
                engine
                    .handle_error(
                        Failure::new("connection reset"),
                        ErrorContext::new().operation("update_status").retry(retry),
                    )
                    .await
            })
        };
        while !f.engine.is_recovering() {
            tokio::task::yield_now().await;
        }

        let during = f.engine.history();
        assert_eq!(during.len(), 1);
        assert_eq!(during[0].class, ErrorClass::Network);
        assert_eq!(during[0].retry_count, 0);
        assert_eq!(f.engine.stats().total, 1);

        gate.notify_one();
        assert!(running.await.unwrap().is_recovered());
        let after = f.engine.history();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, during[0].id);
        assert_eq!(after[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let f = fixture(true);
        for i in 0..(DEFAULT_ERROR_HISTORY_CAPACITY + 10) {
            f.engine
                .handle_error(Failure::new(format!("odd {i}")), ErrorContext::new())
                .await;
        }
        let history = f.engine.history();
        assert_eq!(history.len(), DEFAULT_ERROR_HISTORY_CAPACITY);
        assert_eq!(history[0].message, "odd 10");
        assert_eq!(history[0].class, ErrorClass::Unknown);

        f.engine.clear_history();
        assert_eq!(f.engine.stats().total, 0);
    }
}
