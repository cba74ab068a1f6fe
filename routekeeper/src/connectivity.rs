//! Network connectivity observation.
//!
//! Components never poll the platform directly; they hold an
//! `Arc<dyn ConnectivityObserver>` and either read the current state or
//! subscribe to transitions through a `tokio::sync::watch` channel.

use tokio::sync::watch;

/// Source of online/offline state.
pub trait ConnectivityObserver: Send + Sync {
    fn is_online(&self) -> bool;

    /// Receiver that observes every state change. The current value is
    /// marked as seen.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity state fed by the embedding platform.
///
/// The host calls [`ConnectivityMonitor::set_online`] from its own network
/// callbacks; duplicate reports are collapsed so subscribers only wake on
/// real transitions.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Report the current state. Returns true if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "Connectivity changed");
        }
        changed
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityObserver for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
