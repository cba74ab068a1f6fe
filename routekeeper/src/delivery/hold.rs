//! "Keep active" resource held while a delivery is in progress.

use std::sync::atomic::{AtomicBool, Ordering};

/// Something that keeps the device working for the active delivery
/// (screen wake lock, background task, foreground service).
pub trait ActivityHold: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

/// Records whether the hold is taken and logs changes.
#[derive(Debug, Default)]
pub struct TracingHold {
    held: AtomicBool,
}

impl TracingHold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl ActivityHold for TracingHold {
    fn acquire(&self) {
        if !self.held.swap(true, Ordering::SeqCst) {
            tracing::debug!("Activity hold acquired");
        }
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::SeqCst) {
            tracing::debug!("Activity hold released");
        }
    }
}
