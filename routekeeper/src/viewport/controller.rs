//! Debounced, loop-guarded viewport change handling.
//!
//! Each raw region change passes, in order: the loop breaker, the gesture
//! filter, and the debounce timer. When the timer expires the most recent
//! viewport is forwarded only if it differs meaningfully from the last one
//! forwarded.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::loop_breaker::{LoopBreaker, LoopBreakerConfig};
use super::types::{ChangeOrigin, Viewport, ViewportChange};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(350);
pub const DEFAULT_CENTER_THRESHOLD_DEG: f64 = 0.001;
pub const DEFAULT_SPAN_THRESHOLD_DEG: f64 = 0.01;
const FORWARD_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct ViewportControllerConfig {
    /// Quiet period before a change is forwarded. Default: 350 ms
    pub debounce: Duration,
    /// Minimum center movement in degrees. Default: 0.001
    pub center_threshold: f64,
    /// Minimum span change in degrees. Default: 0.01
    pub span_threshold: f64,
    pub loop_breaker: LoopBreakerConfig,
}

impl Default for ViewportControllerConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            center_threshold: DEFAULT_CENTER_THRESHOLD_DEG,
            span_threshold: DEFAULT_SPAN_THRESHOLD_DEG,
            loop_breaker: LoopBreakerConfig::default(),
        }
    }
}

/// What happened to a raw region change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDecision {
    /// Debounce timer (re)started with this viewport.
    Scheduled,
    SuppressedByLoopBreaker,
    IgnoredProgrammatic,
    InvalidViewport,
}

struct ControllerState {
    breaker: LoopBreaker,
    pending: Option<JoinHandle<()>>,
    /// Bumped whenever the pending timer is replaced or cancelled.
    generation: u64,
    last_forwarded: Option<Viewport>,
}

pub struct ViewportController {
    config: ViewportControllerConfig,
    state: Arc<Mutex<ControllerState>>,
    tx: mpsc::Sender<Viewport>,
}

impl ViewportController {
    /// Create a controller and the receiver for forwarded viewports.
    ///
    /// Must be called inside a tokio runtime; debounce timers are spawned
    /// tasks.
    pub fn new(config: ViewportControllerConfig) -> (Self, mpsc::Receiver<Viewport>) {
        let (tx, rx) = mpsc::channel(FORWARD_CHANNEL_CAPACITY);
        let state = ControllerState {
            breaker: LoopBreaker::new(config.loop_breaker),
            pending: None,
            generation: 0,
            last_forwarded: None,
        };
        let controller = Self {
            config,
            state: Arc::new(Mutex::new(state)),
            tx,
        };
        (controller, rx)
    }

    pub fn config(&self) -> &ViewportControllerConfig {
        &self.config
    }

    pub fn on_region_change(&self, change: ViewportChange) -> ChangeDecision {
        let mut state = self.state.lock().unwrap();

        if !state.breaker.record(Instant::now()) {
            return ChangeDecision::SuppressedByLoopBreaker;
        }

        if change.origin == ChangeOrigin::Programmatic {
            debug!("Ignoring programmatic viewport change");
            return ChangeDecision::IgnoredProgrammatic;
        }

        if !change.viewport.is_valid() {
            warn!(viewport = ?change.viewport, "Ignoring invalid viewport");
            return ChangeDecision::InvalidViewport;
        }

        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let viewport = change.viewport;
        let shared = Arc::clone(&self.state);
        let tx = self.tx.clone();
        let config = self.config;

        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(config.debounce).await;
            let forward = {
                let mut state = shared.lock().unwrap();
                if state.generation != generation {
                    return;
                }
                state.pending = None;
                let significant = state.last_forwarded.map_or(true, |last| {
                    viewport.differs_from(&last, config.center_threshold, config.span_threshold)
                });
                if significant {
                    state.last_forwarded = Some(viewport);
                }
                significant
            };

            if forward {
                if tx.send(viewport).await.is_err() {
                    debug!("Viewport receiver dropped");
                }
            } else {
                debug!(viewport = ?viewport, "Viewport change below threshold");
            }
        }));

        ChangeDecision::Scheduled
    }

    /// Last viewport handed to the receiver.
    pub fn last_forwarded(&self) -> Option<Viewport> {
        self.state.lock().unwrap().last_forwarded
    }

    pub fn has_pending(&self) -> bool {
        self.state.lock().unwrap().pending.is_some()
    }

    /// Drop any pending change and forward `viewport` right away.
    ///
    /// Used when the map itself failed and has to start over from a known
    /// viewport.
    pub fn reset_to(&self, viewport: Viewport) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(pending) = state.pending.take() {
                pending.abort();
            }
            state.generation += 1;
            state.last_forwarded = Some(viewport);
        }
        if self.tx.try_send(viewport).is_err() {
            warn!(viewport = ?viewport, "Could not forward viewport reset");
        }
    }

    /// Cancel any pending timer and reset all counters.
    pub fn cleanup(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.generation += 1;
        state.breaker.reset();
        state.last_forwarded = None;
    }
}

impl Drop for ViewportController {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for ViewportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
