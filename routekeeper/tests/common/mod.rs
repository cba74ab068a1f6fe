//! Shared collaborators for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;

use routekeeper::config::ConfigFile;
use routekeeper::connectivity::ConnectivityMonitor;
use routekeeper::delivery::{
    DeliveryApi, DeliveryApiError, DeliveryStatus, DeliveryTrackingRecord, LocationReport,
    StatusUpdateRequest,
};
use routekeeper::location::{
    FixStream, LocationProvider, PermissionStatus, PositionOptions, ProviderError, RawFix,
};
use routekeeper::service::TrackingServices;
use routekeeper::store::MemoryStore;

/// Santo Domingo, the default region used throughout the tests.
pub const HOME: (f64, f64) = (18.4861, -69.9312);

/// How [`ScriptedApi`] answers status updates.
#[derive(Debug, Clone)]
pub enum StatusReply {
    Accept,
    Unreachable,
    /// 409 with the server's view of the delivery.
    Conflict(DeliveryStatus),
}

/// Delivery API that records every call and answers from a script.
pub struct ScriptedApi {
    reply: Mutex<StatusReply>,
    pub status_updates: Mutex<Vec<(String, DeliveryStatus)>>,
    pub location_updates: Mutex<Vec<(String, LocationReport)>>,
}

impl ScriptedApi {
    pub fn new(reply: StatusReply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            status_updates: Mutex::new(Vec::new()),
            location_updates: Mutex::new(Vec::new()),
        })
    }

    pub fn set_reply(&self, reply: StatusReply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn statuses(&self) -> Vec<DeliveryStatus> {
        self.status_updates
            .lock()
            .unwrap()
            .iter()
            .map(|(_, status)| *status)
            .collect()
    }

    fn server_status(&self) -> Option<DeliveryStatus> {
        match &*self.reply.lock().unwrap() {
            StatusReply::Conflict(status) => Some(*status),
            _ => None,
        }
    }
}

impl DeliveryApi for ScriptedApi {
    fn get_delivery<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<DeliveryTrackingRecord, DeliveryApiError>> {
        async move {
            let mut record = DeliveryTrackingRecord::new(id);
            if let Some(status) = self.server_status() {
                record.mark(status, Utc::now());
            }
            Ok(record)
        }
        .boxed()
    }

    fn update_status<'a>(
        &'a self,
        id: &'a str,
        request: &'a StatusUpdateRequest,
    ) -> BoxFuture<'a, Result<(), DeliveryApiError>> {
        async move {
            let reply = self.reply.lock().unwrap().clone();
            match reply {
                StatusReply::Accept => {
                    self.status_updates
                        .lock()
                        .unwrap()
                        .push((id.to_string(), request.status));
                    Ok(())
                }
                StatusReply::Unreachable => {
                    Err(DeliveryApiError::Unreachable("connection refused".to_string()))
                }
                StatusReply::Conflict(_) => Err(DeliveryApiError::Rejected {
                    status: Some(409),
                    code: Some("INVALID_STATUS_TRANSITION".to_string()),
                    message: "status changed on the server".to_string(),
                }),
            }
        }
        .boxed()
    }

    fn update_location<'a>(
        &'a self,
        id: &'a str,
        report: &'a LocationReport,
    ) -> BoxFuture<'a, Result<(), DeliveryApiError>> {
        async move {
            self.location_updates
                .lock()
                .unwrap()
                .push((id.to_string(), report.clone()));
            Ok(())
        }
        .boxed()
    }
}

/// Provider that always answers with the same fix.
pub struct FixedProvider {
    pub fix: Result<RawFix, ProviderError>,
}

impl FixedProvider {
    pub fn at(latitude: f64, longitude: f64) -> Arc<Self> {
        Arc::new(Self {
            fix: Ok(RawFix::new(latitude, longitude).with_accuracy(5.0)),
        })
    }

    pub fn failing(error: ProviderError) -> Arc<Self> {
        Arc::new(Self { fix: Err(error) })
    }
}

impl LocationProvider for FixedProvider {
    fn request_permission(&self) -> BoxFuture<'_, PermissionStatus> {
        async { PermissionStatus::Granted }.boxed()
    }

    fn current_position(
        &self,
        _options: PositionOptions,
    ) -> BoxFuture<'_, Result<RawFix, ProviderError>> {
        let fix = self.fix.clone();
        async move { fix }.boxed()
    }

    fn watch_position(&self, _options: PositionOptions) -> Result<FixStream, ProviderError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
}

/// Services over in-memory collaborators.
pub struct Harness {
    pub services: TrackingServices,
    pub api: Arc<ScriptedApi>,
    pub store: Arc<MemoryStore>,
    pub monitor: Arc<ConnectivityMonitor>,
}

impl Harness {
    pub async fn start(reply: StatusReply, online: bool) -> Self {
        let mut config = ConfigFile::default();
        config.delivery.confirm_backoff_ms = 10;
        Self::with_config(config, reply, online).await
    }

    pub async fn with_config(config: ConfigFile, reply: StatusReply, online: bool) -> Self {
        let api = ScriptedApi::new(reply);
        let store = Arc::new(MemoryStore::new());
        let monitor = Arc::new(ConnectivityMonitor::new(online));
        let services = TrackingServices::builder(config)
            .location_provider(FixedProvider::at(HOME.0, HOME.1))
            .delivery_api(api.clone())
            .store(store.clone())
            .connectivity(monitor.clone())
            .build()
            .await
            .expect("services should build");
        Self {
            services,
            api,
            store,
            monitor,
        }
    }
}
