//! Location service: permissions, single fixes, tracking and fallbacks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::LocationError;
use super::provider::{FixStream, LocationProvider, PermissionStatus, PositionOptions};
use super::registry::{LocationCallback, SubscriberId, SubscriberRegistry};
use super::sample::LocationSample;
use crate::coord::{Coordinate, DEFAULT_REGION_CENTER};
use crate::history::BoundedHistory;
use crate::notify::{Notice, NoticeAction, Presenter};
use crate::retry::{Backoff, RetryPolicy};
use crate::store::{keys, load_json, save_json, KeyValueStore};
use crate::time::is_older_than;

/// Amount the timeout guard undercuts the platform timeout.
pub const DEFAULT_TIMEOUT_MARGIN: Duration = Duration::from_secs(1);

/// Smallest margin accepted; the guard must always fire before the platform.
pub const MIN_TIMEOUT_MARGIN: Duration = Duration::from_millis(1);

/// Per-attempt timeouts for [`LocationService::get_location_with_fallback`].
pub const DEFAULT_FALLBACK_TIMEOUTS: [Duration; 3] = [
    Duration::from_secs(15),
    Duration::from_secs(10),
    Duration::from_secs(5),
];

/// Oldest last-known sample still usable as a fallback.
pub const DEFAULT_MAX_LAST_KNOWN_AGE: Duration = Duration::from_secs(6 * 60 * 60);

/// Capacity of the persisted sample history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct LocationServiceConfig {
    pub timeout_margin: Duration,
    pub fallback_timeouts: Vec<Duration>,
    pub max_last_known_age: Duration,
    /// Last resort for the fallback chain. `None` makes exhaustion an error.
    pub default_location: Option<Coordinate>,
    pub history_capacity: usize,
    /// Options for fallback fixes and watches.
    pub position_options: PositionOptions,
}

impl Default for LocationServiceConfig {
    fn default() -> Self {
        Self {
            timeout_margin: DEFAULT_TIMEOUT_MARGIN,
            fallback_timeouts: DEFAULT_FALLBACK_TIMEOUTS.to_vec(),
            max_last_known_age: DEFAULT_MAX_LAST_KNOWN_AGE,
            default_location: Some(DEFAULT_REGION_CENTER),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            position_options: PositionOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Watching,
}

/// Where a fallback location came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    Live,
    LastKnown,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLocation {
    pub sample: LocationSample,
    pub source: LocationSource,
}

struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    registry: Mutex<SubscriberRegistry>,
    watch: Mutex<Option<WatchHandle>>,
}

impl Shared {
    fn dispatch(&self, sample: &LocationSample) {
        let callbacks = self.registry.lock().unwrap().callbacks();
        for callback in callbacks {
            callback(sample);
        }
    }

    fn stop_watch(&self) -> bool {
        match self.watch.lock().unwrap().take() {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Device location with validation, persistence and a fan-out watch.
///
/// One upstream platform watch is shared by every tracking subscriber.
pub struct LocationService {
    provider: Arc<dyn LocationProvider>,
    store: Arc<dyn KeyValueStore>,
    presenter: Arc<dyn Presenter>,
    config: LocationServiceConfig,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl LocationService {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        store: Arc<dyn KeyValueStore>,
        presenter: Arc<dyn Presenter>,
        config: LocationServiceConfig,
    ) -> Self {
        Self {
            provider,
            store,
            presenter,
            config,
            shared: Arc::new(Shared {
                registry: Mutex::new(SubscriberRegistry::new()),
                watch: Mutex::new(None),
            }),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &LocationServiceConfig {
        &self.config
    }

    pub fn default_location(&self) -> Option<Coordinate> {
        self.config.default_location
    }

    /// Ask the platform for permission, surfacing a settings prompt on denial.
    pub async fn request_permission(&self) -> PermissionStatus {
        let status = self.provider.request_permission().await;
        if status == PermissionStatus::Denied {
            tracing::warn!("Location permission denied");
            self.presenter.notify(
                Notice::new(
                    "Location permission required",
                    "Location access is needed to track deliveries. Enable it in settings.",
                )
                .with_actions(vec![NoticeAction::OpenSettings, NoticeAction::Dismiss]),
            );
        }
        status
    }

    /// Guard deadline for a request with the given platform timeout.
    ///
    /// Always strictly shorter than `timeout` (for non-zero timeouts).
    pub fn guard_timeout(&self, timeout: Duration) -> Duration {
        let margin = self.config.timeout_margin.max(MIN_TIMEOUT_MARGIN);
        match timeout.checked_sub(margin) {
            Some(guard) if !guard.is_zero() => guard,
            _ => timeout / 2,
        }
    }

    /// Fetch, validate and persist a single fix.
    pub async fn get_current_location(
        &self,
        options: PositionOptions,
    ) -> Result<LocationSample, LocationError> {
        let guard = self.guard_timeout(options.timeout);

        let fix = match tokio::time::timeout(guard, self.provider.current_position(options)).await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(guard_ms = guard.as_millis() as u64, "Location request timed out");
                return Err(LocationError::Timeout(guard));
            }
        };

        let sample = LocationSample::from_fix(&fix).map_err(|e| {
            tracing::warn!(
                latitude = fix.latitude,
                longitude = fix.longitude,
                error = %e,
                "Provider returned invalid coordinates"
            );
            LocationError::InvalidCoordinates(e)
        })?;

        persist_sample(self.store.as_ref(), &sample, self.config.history_capacity).await;
        Ok(sample)
    }

    /// Subscribe to continuous updates.
    ///
    /// The upstream watch is (re)started with `options`; any prior watch is
    /// stopped first. Existing subscribers keep receiving samples from the
    /// new watch.
    pub fn start_tracking(
        &self,
        callback: LocationCallback,
        options: PositionOptions,
    ) -> Result<SubscriberId, LocationError> {
        let id = self.shared.registry.lock().unwrap().insert(callback);

        if self.shared.stop_watch() {
            tracing::debug!("Restarting location watch");
        }

        let stream = match self.provider.watch_position(options) {
            Ok(stream) => stream,
            Err(e) => {
                let mut registry = self.shared.registry.lock().unwrap();
                registry.remove(id);
                tracing::warn!(error = %e, "Failed to start location watch");
                return Err(e.into());
            }
        };

        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(run_watch(
            stream,
            cancel.clone(),
            Arc::clone(&self.shared),
            Arc::clone(&self.store),
            self.config.history_capacity,
        ));
        *self.shared.watch.lock().unwrap() = Some(WatchHandle { cancel, task });

        tracing::info!(subscriber = ?id, "Location tracking started");
        Ok(id)
    }

    /// Remove one subscriber; the watch stops with the last one.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let (removed, empty) = {
            let mut registry = self.shared.registry.lock().unwrap();
            let removed = registry.remove(id);
            (removed, registry.is_empty())
        };
        if removed && empty && self.shared.stop_watch() {
            tracing::info!("Last subscriber left, location watch stopped");
        }
        removed
    }

    /// Stop the watch and drop every subscriber. No-op when idle.
    pub fn stop_tracking(&self) {
        let stopped = self.shared.stop_watch();
        let mut registry = self.shared.registry.lock().unwrap();
        if !stopped && registry.is_empty() {
            return;
        }
        registry.clear();
        tracing::info!("Location tracking stopped");
    }

    pub fn state(&self) -> TrackingState {
        match self.shared.watch.lock().unwrap().as_ref() {
            Some(handle) if !handle.task.is_finished() => TrackingState::Watching,
            _ => TrackingState::Idle,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.lock().unwrap().len()
    }

    /// Best available location.
    ///
    /// Tries live fixes with shrinking timeouts, then a recent last-known
    /// sample, then the configured default.
    pub async fn get_location_with_fallback(&self) -> Result<ResolvedLocation, LocationError> {
        let timeouts = &self.config.fallback_timeouts;
        let policy = RetryPolicy::new(timeouts.len() as u32, Backoff::Fixed(Duration::ZERO));

        let live = policy
            .run_while(
                &self.shutdown,
                |attempt| {
                    let timeout = timeouts
                        .get(attempt as usize - 1)
                        .copied()
                        .unwrap_or(self.config.position_options.timeout);
                    let options = self.config.position_options.with_timeout(timeout);
                    async move { self.get_current_location(options).await }
                },
                |e| !matches!(e, LocationError::PermissionDenied),
            )
            .await;

        let attempts = match live {
            Ok((sample, _)) => {
                return Ok(ResolvedLocation {
                    sample,
                    source: LocationSource::Live,
                })
            }
            Err(e) => {
                tracing::warn!(
                    attempts = e.attempts(),
                    error = ?e.last_error(),
                    "Live location unavailable, falling back"
                );
                e.attempts()
            }
        };

        match self.last_known_location().await {
            Ok(Some(sample)) if !is_older_than(sample.saved_at, self.config.max_last_known_age) => {
                tracing::info!("Using last known location");
                return Ok(ResolvedLocation {
                    sample,
                    source: LocationSource::LastKnown,
                });
            }
            Ok(Some(_)) => tracing::debug!("Last known location is stale"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Could not read last known location"),
        }

        match self.config.default_location {
            Some(coordinate) => {
                tracing::info!(
                    latitude = coordinate.latitude,
                    longitude = coordinate.longitude,
                    "Using default location"
                );
                Ok(ResolvedLocation {
                    sample: LocationSample::from_coordinate(coordinate),
                    source: LocationSource::Default,
                })
            }
            None => Err(LocationError::Exhausted { attempts }),
        }
    }

    pub async fn last_known_location(&self) -> Result<Option<LocationSample>, LocationError> {
        Ok(load_json(self.store.as_ref(), keys::LAST_KNOWN_LOCATION).await?)
    }

    /// Persisted samples, oldest first.
    pub async fn location_history(&self) -> Result<Vec<LocationSample>, LocationError> {
        let entries: Option<Vec<LocationSample>> =
            load_json(self.store.as_ref(), keys::LOCATION_SAMPLES).await?;
        Ok(entries.unwrap_or_default())
    }

    /// Stop tracking and cancel in-flight fallback backoffs.
    pub fn shutdown(&self) {
        self.stop_tracking();
        self.shutdown.cancel();
    }
}

impl Drop for LocationService {
    fn drop(&mut self) {
        self.shared.stop_watch();
    }
}

async fn run_watch(
    mut stream: FixStream,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    store: Arc<dyn KeyValueStore>,
    history_capacity: usize,
) {
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = stream.recv() => item,
        };

        let fix = match item {
            Some(Ok(fix)) => fix,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Location watch reported an error");
                continue;
            }
            None => {
                tracing::debug!("Location watch stream closed");
                break;
            }
        };

        let sample = match LocationSample::from_fix(&fix) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(
                    latitude = fix.latitude,
                    longitude = fix.longitude,
                    error = %e,
                    "Dropping invalid location sample"
                );
                continue;
            }
        };

        persist_sample(store.as_ref(), &sample, history_capacity).await;

        // Tracking may have stopped while the store write was pending.
        if cancel.is_cancelled() {
            break;
        }
        shared.dispatch(&sample);
    }
}

/// Store `sample` as last known and append it to the bounded history.
///
/// Persistence failures are logged; a sample is still usable in memory.
async fn persist_sample(store: &dyn KeyValueStore, sample: &LocationSample, capacity: usize) {
    if let Err(e) = save_json(store, keys::LAST_KNOWN_LOCATION, sample).await {
        tracing::warn!(error = %e, "Failed to persist last known location");
    }

    let entries: Vec<LocationSample> = match load_json(store, keys::LOCATION_SAMPLES).await {
        Ok(entries) => entries.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Location history unreadable, starting fresh");
            Vec::new()
        }
    };
    let mut history = BoundedHistory::from_entries(capacity, entries);
    history.push(*sample);

    if let Err(e) = save_json(store, keys::LOCATION_SAMPLES, &history).await {
        tracing::warn!(error = %e, "Failed to persist location history");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::provider::{ProviderError, RawFix};
    use crate::store::MemoryStore;
    use futures::future::{BoxFuture, FutureExt};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    // ========================================================================
    // Test Helpers
    // ========================================================================

    #[derive(Default)]
    struct MockProvider {
        permission: Mutex<Option<PermissionStatus>>,
        fixes: Mutex<VecDeque<Result<RawFix, ProviderError>>>,
        hang: std::sync::atomic::AtomicBool,
        watch_tx: Mutex<Option<mpsc::Sender<Result<RawFix, ProviderError>>>>,
        watches_started: AtomicUsize,
        fix_requests: AtomicUsize,
    }

    impl MockProvider {
        fn push_fix(&self, fix: Result<RawFix, ProviderError>) {
            self.fixes.lock().unwrap().push_back(fix);
        }

        fn watch_sender(&self) -> mpsc::Sender<Result<RawFix, ProviderError>> {
            self.watch_tx.lock().unwrap().clone().expect("watch not started")
        }
    }

    impl LocationProvider for MockProvider {
        fn request_permission(&self) -> BoxFuture<'_, PermissionStatus> {
            let status = self
                .permission
                .lock()
                .unwrap()
                .unwrap_or(PermissionStatus::Granted);
            async move { status }.boxed()
        }

        fn current_position(
            &self,
            _options: PositionOptions,
        ) -> BoxFuture<'_, Result<RawFix, ProviderError>> {
            self.fix_requests.fetch_add(1, Ordering::SeqCst);
            if self.hang.load(Ordering::SeqCst) {
                return futures::future::pending().boxed();
            }
            let next = self
                .fixes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProviderError::PositionUnavailable("no fix".into())));
            async move { next }.boxed()
        }

        fn watch_position(&self, _options: PositionOptions) -> Result<FixStream, ProviderError> {
            self.watches_started.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel(16);
            *self.watch_tx.lock().unwrap() = Some(tx);
            Ok(rx)
        }
    }

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
        provider: Arc<MockProvider>,
        store: Arc<MemoryStore>,
        presenter: Arc<RecordingPresenter>,
        service: LocationService,
    }

    fn fixture(config: LocationServiceConfig) -> Fixture {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(MemoryStore::new());
        let presenter = Arc::new(RecordingPresenter::default());
        let service = LocationService::new(
            provider.clone(),
            store.clone(),
            presenter.clone(),
            config,
        );
        Fixture {
            provider,
            store,
            presenter,
            service,
        }
    }

    fn recording_callback() -> (LocationCallback, mpsc::UnboundedReceiver<LocationSample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: LocationCallback = Arc::new(move |sample: &LocationSample| {
            let _ = tx.send(*sample);
        });
        (callback, rx)
    }

    // ========================================================================
    // Single fixes
    // ========================================================================

    #[test]
    fn test_guard_timeout_is_strictly_shorter() {
        let f = fixture(LocationServiceConfig::default());
        assert_eq!(
            f.service.guard_timeout(Duration::from_secs(15)),
            Duration::from_secs(14)
        );
        assert_eq!(
            f.service.guard_timeout(Duration::from_millis(800)),
            Duration::from_millis(400)
        );

        let f = fixture(LocationServiceConfig {
            timeout_margin: Duration::ZERO,
            ..Default::default()
        });
        assert!(f.service.guard_timeout(Duration::from_secs(5)) < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_accepted_fix_is_persisted() {
        let f = fixture(LocationServiceConfig::default());
        f.provider
            .push_fix(Ok(RawFix::new(18.47, -69.89).with_accuracy(12.0)));

        let sample = f
            .service
            .get_current_location(PositionOptions::default())
            .await
            .unwrap();
        assert_eq!(sample.latitude(), 18.47);
        assert_eq!(sample.coordinate.accuracy, Some(12.0));

        let last = f.service.last_known_location().await.unwrap().unwrap();
        assert_eq!(last.longitude(), -69.89);
        assert_eq!(f.service.location_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_fix_is_rejected_and_not_persisted() {
        let f = fixture(LocationServiceConfig::default());
        f.provider.push_fix(Ok(RawFix::new(0.0, 0.0)));

        let err = f
            .service
            .get_current_location(PositionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LocationError::InvalidCoordinates(_)));
        assert!(f.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_provider_times_out_before_platform() {
        let f = fixture(LocationServiceConfig::default());
        f.provider.hang.store(true, Ordering::SeqCst);

        let err = f
            .service
            .get_current_location(PositionOptions::default().with_timeout(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, LocationError::Timeout(d) if d == Duration::from_secs(4)));
    }

    #[tokio::test]
    async fn test_permission_denied_surfaces_settings_notice() {
        let f = fixture(LocationServiceConfig::default());
        *f.provider.permission.lock().unwrap() = Some(PermissionStatus::Denied);

        assert_eq!(f.service.request_permission().await, PermissionStatus::Denied);

        let notices = f.presenter.notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].actions.contains(&NoticeAction::OpenSettings));
    }

    #[tokio::test]
    async fn test_permission_granted_is_silent() {
        let f = fixture(LocationServiceConfig::default());
        assert_eq!(f.service.request_permission().await, PermissionStatus::Granted);
        assert!(f.presenter.notices.lock().unwrap().is_empty());
    }

    // ========================================================================
    // Tracking
    // ========================================================================

    #[tokio::test]
    async fn test_tracking_drops_invalid_samples() {
        let f = fixture(LocationServiceConfig::default());
        let (callback, mut rx) = recording_callback();
        f.service
            .start_tracking(callback, PositionOptions::default())
            .unwrap();
        assert_eq!(f.service.state(), TrackingState::Watching);

        let tx = f.provider.watch_sender();
        tx.send(Ok(RawFix::new(0.0, 0.0))).await.unwrap();
        tx.send(Ok(RawFix::new(95.0, 10.0))).await.unwrap();
        tx.send(Ok(RawFix::new(18.5, -69.9))).await.unwrap();

        let sample = rx.recv().await.unwrap();
        assert_eq!(sample.latitude(), 18.5);
        assert!(rx.try_recv().is_err());

        let history = f.service.location_history().await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_second_subscriber_restarts_single_watch() {
        let f = fixture(LocationServiceConfig::default());
        let (first_cb, mut first_rx) = recording_callback();
        let (second_cb, mut second_rx) = recording_callback();

        f.service
            .start_tracking(first_cb, PositionOptions::default())
            .unwrap();
        let old_tx = f.provider.watch_sender();

        f.service
            .start_tracking(second_cb, PositionOptions::default())
            .unwrap();
        assert_eq!(f.provider.watches_started.load(Ordering::SeqCst), 2);
        assert_eq!(f.service.subscriber_count(), 2);

        // The prior upstream watch is released.
        old_tx.closed().await;

        f.provider
            .watch_sender()
            .send(Ok(RawFix::new(18.5, -69.9)))
            .await
            .unwrap();
        assert_eq!(first_rx.recv().await.unwrap().latitude(), 18.5);
        assert_eq!(second_rx.recv().await.unwrap().latitude(), 18.5);
    }

    #[tokio::test]
    async fn test_last_unsubscribe_stops_watch() {
        let f = fixture(LocationServiceConfig::default());
        let (a_cb, _a_rx) = recording_callback();
        let (b_cb, _b_rx) = recording_callback();
        let a = f
            .service
            .start_tracking(a_cb, PositionOptions::default())
            .unwrap();
        let b = f
            .service
            .start_tracking(b_cb, PositionOptions::default())
            .unwrap();
        let tx = f.provider.watch_sender();

        assert!(f.service.unsubscribe(a));
        assert_eq!(f.service.state(), TrackingState::Watching);

        assert!(f.service.unsubscribe(b));
        tx.closed().await;
        assert_eq!(f.service.state(), TrackingState::Idle);
        assert!(!f.service.unsubscribe(b));
    }

    #[tokio::test]
    async fn test_stop_tracking_is_idempotent() {
        let f = fixture(LocationServiceConfig::default());
        f.service.stop_tracking();
        assert_eq!(f.service.state(), TrackingState::Idle);

        let (cb, _rx) = recording_callback();
        f.service
            .start_tracking(cb, PositionOptions::default())
            .unwrap();
        f.service.stop_tracking();
        f.service.stop_tracking();
        assert_eq!(f.service.subscriber_count(), 0);
        assert_eq!(f.service.state(), TrackingState::Idle);
    }

    // ========================================================================
    // Fallback chain
    // ========================================================================

    #[tokio::test]
    async fn test_fallback_succeeds_on_later_attempt() {
        let f = fixture(LocationServiceConfig::default());
        f.provider
            .push_fix(Err(ProviderError::PositionUnavailable("cold start".into())));
        f.provider.push_fix(Ok(RawFix::new(19.45, -70.69)));

        let resolved = f.service.get_location_with_fallback().await.unwrap();
        assert_eq!(resolved.source, LocationSource::Live);
        assert_eq!(f.provider.fix_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fallback_uses_recent_last_known() {
        let f = fixture(LocationServiceConfig::default());
        let last = LocationSample::from_fix(&RawFix::new(19.45, -70.69)).unwrap();
        save_json(f.store.as_ref(), keys::LAST_KNOWN_LOCATION, &last)
            .await
            .unwrap();

        let resolved = f.service.get_location_with_fallback().await.unwrap();
        assert_eq!(resolved.source, LocationSource::LastKnown);
        assert_eq!(resolved.sample.latitude(), 19.45);
        assert_eq!(f.provider.fix_requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fallback_skips_stale_last_known() {
        let f = fixture(LocationServiceConfig::default());
        let mut last = LocationSample::from_fix(&RawFix::new(19.45, -70.69)).unwrap();
        last.saved_at = chrono::Utc::now() - chrono::Duration::hours(7);
        save_json(f.store.as_ref(), keys::LAST_KNOWN_LOCATION, &last)
            .await
            .unwrap();

        let resolved = f.service.get_location_with_fallback().await.unwrap();
        assert_eq!(resolved.source, LocationSource::Default);
        assert_eq!(resolved.sample.coordinate, DEFAULT_REGION_CENTER);
    }

    #[tokio::test]
    async fn test_fallback_without_default_is_exhausted() {
        let f = fixture(LocationServiceConfig {
            default_location: None,
            ..Default::default()
        });

        let err = f.service.get_location_with_fallback().await.unwrap_err();
        assert!(matches!(err, LocationError::Exhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_permission_denied_stops_live_attempts() {
        let f = fixture(LocationServiceConfig::default());
        f.provider.push_fix(Err(ProviderError::PermissionDenied));

        let resolved = f.service.get_location_with_fallback().await.unwrap();
        assert_eq!(resolved.source, LocationSource::Default);
        assert_eq!(f.provider.fix_requests.load(Ordering::SeqCst), 1);
    }
}
