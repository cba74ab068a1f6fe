//! Fan-out registry over the single upstream location watch.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::sample::LocationSample;

/// Consumer callback for tracked samples.
pub type LocationCallback = Arc<dyn Fn(&LocationSample) + Send + Sync>;

/// Handle returned by `start_tracking`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

/// Set of subscribers whose non-emptiness keeps the upstream watch alive.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    subscribers: BTreeMap<SubscriberId, LocationCallback>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, callback: LocationCallback) -> SubscriberId {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        self.subscribers.insert(id, callback);
        id
    }

    /// Returns true if the subscriber existed.
    pub fn remove(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Callbacks in subscription order.
    ///
    /// Callers invoke these after releasing any lock on the registry so a
    /// callback may itself subscribe or unsubscribe.
    pub fn callbacks(&self) -> Vec<LocationCallback> {
        self.subscribers.values().cloned().collect()
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
