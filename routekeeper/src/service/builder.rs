//! Component construction for [`super::TrackingServices`].
//!
//! Each function builds one component from the loaded [`ConfigFile`] and
//! its already-built collaborators, so the facade only has to order them.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use super::error::ServiceError;
use crate::config::ConfigFile;
use crate::connectivity::ConnectivityObserver;
use crate::delivery::{
    ActivityHold, DeliveryActionHandler, DeliveryApi, DeliveryStateMachine, HttpDeliveryApi,
    RealtimeChannel,
};
use crate::location::{LocationProvider, LocationService};
use crate::notify::Presenter;
use crate::offline::{ActionType, OfflineQueue};
use crate::recovery::{CredentialRefresher, ErrorContext, ErrorRecoveryEngine, Failure};
use crate::store::KeyValueStore;

/// HTTP delivery API from `[delivery] api_base_url`.
pub fn create_delivery_api(config: &ConfigFile) -> Result<Arc<dyn DeliveryApi>, ServiceError> {
    let base_url = config
        .delivery
        .api_base_url
        .as_deref()
        .ok_or(ServiceError::MissingComponent("delivery API base URL"))?;
    let api = HttpDeliveryApi::with_timeout(base_url, config.request_timeout())?;
    info!(base_url = %api.base_url(), "Using HTTP delivery API");
    Ok(Arc::new(api))
}

/// Offline queue over the shared store. Not yet hydrated.
pub fn create_offline_queue(
    config: &ConfigFile,
    store: Arc<dyn KeyValueStore>,
    connectivity: Arc<dyn ConnectivityObserver>,
) -> Arc<OfflineQueue> {
    Arc::new(OfflineQueue::new(
        store,
        connectivity,
        config.offline_config(),
    ))
}

/// Run `load`, handing each corrupt key it trips over to `recovery`.
///
/// Reloads after every successful repair. Gives up with the original error
/// when recovery fails or the same key stays corrupt.
pub async fn load_with_repair<T, F, Fut>(
    recovery: &ErrorRecoveryEngine,
    mut load: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut repaired: Vec<String> = Vec::new();
    loop {
        let err = match load().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        let Some(key) = err.corrupted_key().map(str::to_string) else {
            return Err(err);
        };
        if repaired.contains(&key) {
            return Err(err);
        }

        let outcome = recovery
            .handle_error(
                Failure::new(err.to_string()),
                ErrorContext::for_storage_key(key.as_str()),
            )
            .await;
        if !outcome.is_recovered() {
            return Err(err);
        }
        warn!(key = %key, "Repaired corrupt stored value, reloading");
        repaired.push(key);
    }
}

/// Route queued status and location updates to the delivery API on sync.
///
/// Confirmed status replays are announced on `channel`.
pub fn register_sync_handlers(
    queue: &OfflineQueue,
    api: Arc<dyn DeliveryApi>,
    channel: Arc<dyn RealtimeChannel>,
) {
    let handler = Arc::new(DeliveryActionHandler::new(api).with_channel(channel));
    queue.register_handler(ActionType::StatusUpdate, handler.clone());
    queue.register_handler(ActionType::LocationUpdate, handler);
}

pub fn create_location_service(
    config: &ConfigFile,
    provider: Arc<dyn LocationProvider>,
    store: Arc<dyn KeyValueStore>,
    presenter: Arc<dyn Presenter>,
) -> Arc<LocationService> {
    Arc::new(LocationService::new(
        provider,
        store,
        presenter,
        config.location_config(),
    ))
}

pub fn create_recovery_engine(
    config: &ConfigFile,
    store: Arc<dyn KeyValueStore>,
    connectivity: Arc<dyn ConnectivityObserver>,
    presenter: Arc<dyn Presenter>,
    offline: Arc<OfflineQueue>,
    location: Arc<LocationService>,
    credentials: Option<Arc<dyn CredentialRefresher>>,
) -> Arc<ErrorRecoveryEngine> {
    let engine = ErrorRecoveryEngine::new(
        store,
        connectivity,
        presenter,
        offline,
        config.recovery_config(),
    )
    .with_location_service(location);
    let engine = match credentials {
        Some(refresher) => engine.with_credential_refresher(refresher),
        None => engine,
    };
    Arc::new(engine)
}

pub fn create_state_machine(
    config: &ConfigFile,
    api: Arc<dyn DeliveryApi>,
    channel: Arc<dyn RealtimeChannel>,
    offline: Arc<OfflineQueue>,
    store: Arc<dyn KeyValueStore>,
    recovery: Arc<ErrorRecoveryEngine>,
    hold: Option<Arc<dyn ActivityHold>>,
) -> Arc<DeliveryStateMachine> {
    let machine = DeliveryStateMachine::new(api, channel, offline, store, config.delivery_config())
        .with_recovery(recovery);
    let machine = match hold {
        Some(hold) => machine.with_activity_hold(hold),
        None => machine,
    };
    Arc::new(machine)
}
