//! Routekeeper service facade implementation.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::builder::{
    create_delivery_api, create_location_service, create_offline_queue, create_recovery_engine,
    create_state_machine, load_with_repair, register_sync_handlers,
};
use super::error::ServiceError;
use super::listeners::{spawn_recovery_listener, spawn_sync_listener};
use crate::config::ConfigFile;
use crate::connectivity::{ConnectivityMonitor, ConnectivityObserver};
use crate::delivery::{
    ActivityHold, BroadcastChannel, DeliveryApi, DeliveryStateMachine, DeliveryTrackingRecord,
    RealtimeChannel,
};
use crate::location::{LocationProvider, LocationSample, LocationService};
use crate::notify::{Presenter, TracingPresenter};
use crate::offline::OfflineQueue;
use crate::recovery::{
    CredentialRefresher, ErrorContext, ErrorRecoveryEngine, RecoveryOutcome, Resolution,
    ServiceHint,
};
use crate::store::{KeyValueStore, MemoryStore};
use crate::viewport::{Viewport, ViewportController};

/// High-level facade over the tracking components.
///
/// Owns one instance of each component, wired to a shared store,
/// connectivity observer and presenter, plus the background listeners
/// that keep them in step.
///
/// # Example
///
/// ```ignore
/// use routekeeper::config::ConfigFile;
/// use routekeeper::service::TrackingServices;
///
/// let services = TrackingServices::builder(ConfigFile::load()?)
///     .location_provider(platform_provider)
///     .build()
///     .await?;
///
/// services.delivery().advance(None, None).await?;
/// services.shutdown().await;
/// ```
pub struct TrackingServices {
    config: ConfigFile,
    store: Arc<dyn KeyValueStore>,
    connectivity: Arc<dyn ConnectivityObserver>,
    offline: Arc<OfflineQueue>,
    location: Arc<LocationService>,
    recovery: Arc<ErrorRecoveryEngine>,
    delivery: Arc<DeliveryStateMachine>,
    viewport: Arc<ViewportController>,
    viewport_updates: Mutex<Option<mpsc::Receiver<Viewport>>>,
    restored: Option<DeliveryTrackingRecord>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl TrackingServices {
    pub fn builder(config: ConfigFile) -> TrackingServicesBuilder {
        TrackingServicesBuilder::new(config)
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn connectivity(&self) -> &Arc<dyn ConnectivityObserver> {
        &self.connectivity
    }

    pub fn offline(&self) -> &Arc<OfflineQueue> {
        &self.offline
    }

    pub fn location(&self) -> &Arc<LocationService> {
        &self.location
    }

    pub fn recovery(&self) -> &Arc<ErrorRecoveryEngine> {
        &self.recovery
    }

    pub fn delivery(&self) -> &Arc<DeliveryStateMachine> {
        &self.delivery
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    /// Best available position, falling back through recovery.
    ///
    /// When the location service's own chain comes up empty, the failure is
    /// handed to the recovery engine, which may still answer with a last
    /// known or default position.
    pub async fn locate(&self) -> Result<LocationSample, ServiceError> {
        let err = match self.location.get_location_with_fallback().await {
            Ok(resolved) => return Ok(resolved.sample),
            Err(e) => e,
        };
        let context = ErrorContext::new()
            .service(ServiceHint::Location)
            .operation("get_location_with_fallback");
        match self.recovery.handle_error(err.clone().into(), context).await {
            RecoveryOutcome::Recovered {
                resolution: Resolution::LastKnownLocation(sample),
                ..
            } => Ok(sample),
            RecoveryOutcome::Recovered {
                resolution: Resolution::DefaultLocation(coordinate),
                ..
            } => Ok(LocationSample::from_coordinate(coordinate)),
            _ => Err(ServiceError::Location(err)),
        }
    }

    /// Delivery that was active when the services were built, if any.
    pub fn restored_delivery(&self) -> Option<&DeliveryTrackingRecord> {
        self.restored.as_ref()
    }

    /// Debounced viewport changes for the data-fetching side.
    ///
    /// The receiver can be taken once; later calls return `None`.
    pub fn take_viewport_updates(&self) -> Option<mpsc::Receiver<Viewport>> {
        self.viewport_updates.lock().unwrap().take()
    }

    /// Stop listeners, cancel pending timers and in-flight backoffs.
    pub async fn shutdown(&self) {
        info!("Shutting down tracking services");
        self.cancel.cancel();
        self.delivery.shutdown();
        self.recovery.shutdown();
        self.location.shutdown();
        self.viewport.cleanup();

        let listeners: Vec<JoinHandle<()>> = self.listeners.lock().unwrap().drain(..).collect();
        for handle in listeners {
            let _ = handle.await;
        }
        debug!("Tracking services stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for TrackingServices {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.delivery.shutdown();
        self.recovery.shutdown();
    }
}

impl std::fmt::Debug for TrackingServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingServices")
            .field("delivery", &self.delivery)
            .field("viewport", &self.viewport)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Builder for [`TrackingServices`].
///
/// Only the location provider is required. The delivery API defaults to
/// HTTP against `[delivery] api_base_url`; everything else falls back to
/// an in-process implementation.
pub struct TrackingServicesBuilder {
    config: ConfigFile,
    location_provider: Option<Arc<dyn LocationProvider>>,
    delivery_api: Option<Arc<dyn DeliveryApi>>,
    realtime_channel: Option<Arc<dyn RealtimeChannel>>,
    store: Option<Arc<dyn KeyValueStore>>,
    connectivity: Option<Arc<dyn ConnectivityObserver>>,
    presenter: Option<Arc<dyn Presenter>>,
    credentials: Option<Arc<dyn CredentialRefresher>>,
    activity_hold: Option<Arc<dyn ActivityHold>>,
}

impl TrackingServicesBuilder {
    pub fn new(config: ConfigFile) -> Self {
        Self {
            config,
            location_provider: None,
            delivery_api: None,
            realtime_channel: None,
            store: None,
            connectivity: None,
            presenter: None,
            credentials: None,
            activity_hold: None,
        }
    }

    /// Platform location source (required).
    pub fn location_provider(mut self, provider: Arc<dyn LocationProvider>) -> Self {
        self.location_provider = Some(provider);
        self
    }

    /// Use this API instead of building an HTTP client from config.
    pub fn delivery_api(mut self, api: Arc<dyn DeliveryApi>) -> Self {
        self.delivery_api = Some(api);
        self
    }

    pub fn realtime_channel(mut self, channel: Arc<dyn RealtimeChannel>) -> Self {
        self.realtime_channel = Some(channel);
        self
    }

    /// Persistent store. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to a monitor that starts online.
    pub fn connectivity(mut self, connectivity: Arc<dyn ConnectivityObserver>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn credential_refresher(mut self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.credentials = Some(refresher);
        self
    }

    pub fn activity_hold(mut self, hold: Arc<dyn ActivityHold>) -> Self {
        self.activity_hold = Some(hold);
        self
    }

    /// Wire the components, hydrate persisted state and start listeners.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if no location provider was supplied, no delivery
    /// API can be built, or persisted state cannot be read and recovery
    /// could not repair it.
    pub async fn build(self) -> Result<TrackingServices, ServiceError> {
        let config = self.config;
        let provider = self
            .location_provider
            .ok_or(ServiceError::MissingComponent("location provider"))?;
        let api = match self.delivery_api {
            Some(api) => api,
            None => create_delivery_api(&config)?,
        };
        let channel: Arc<dyn RealtimeChannel> = self
            .realtime_channel
            .unwrap_or_else(|| Arc::new(BroadcastChannel::default()));
        let store: Arc<dyn KeyValueStore> =
            self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let connectivity: Arc<dyn ConnectivityObserver> = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ConnectivityMonitor::default()));
        let presenter: Arc<dyn Presenter> =
            self.presenter.unwrap_or_else(|| Arc::new(TracingPresenter));

        let offline = create_offline_queue(&config, store.clone(), connectivity.clone());
        let location =
            create_location_service(&config, provider, store.clone(), presenter.clone());
        let recovery = create_recovery_engine(
            &config,
            store.clone(),
            connectivity.clone(),
            presenter,
            offline.clone(),
            location.clone(),
            self.credentials,
        );

        load_with_repair(&recovery, || {
            let queue = Arc::clone(&offline);
            async move { queue.load().await.map_err(ServiceError::from) }
        })
        .await?;
        register_sync_handlers(&offline, api.clone(), channel.clone());

        let delivery = create_state_machine(
            &config,
            api,
            channel,
            offline.clone(),
            store.clone(),
            recovery.clone(),
            self.activity_hold,
        );
        let restored = load_with_repair(&recovery, || {
            let machine = Arc::clone(&delivery);
            async move { machine.restore().await.map_err(ServiceError::from) }
        })
        .await?;

        let (viewport, viewport_rx) = ViewportController::new(config.viewport_config());
        let viewport = Arc::new(viewport);

        let cancel = CancellationToken::new();
        let listeners = vec![
            offline.spawn_reconnect_listener(cancel.child_token()),
            delivery.spawn_realtime_listener(),
            spawn_sync_listener(
                &offline,
                recovery.clone(),
                delivery.clone(),
                cancel.child_token(),
            ),
            spawn_recovery_listener(&recovery, viewport.clone(), cancel.child_token()),
        ];

        info!(
            online = connectivity.is_online(),
            restored = restored.as_ref().map(|r| r.id.as_str()),
            "Tracking services started"
        );

        Ok(TrackingServices {
            config,
            store,
            connectivity,
            offline,
            location,
            recovery,
            delivery,
            viewport,
            viewport_updates: Mutex::new(Some(viewport_rx)),
            restored,
            listeners: Mutex::new(listeners),
            cancel,
        })
    }
}
