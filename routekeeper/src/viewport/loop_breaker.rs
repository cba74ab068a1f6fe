//! Circuit breaker against runaway viewport update cycles.
//!
//! ```text
//! Closed --[more than `ceiling` events inside the window]--> Tripped
//! Tripped --[window elapsed since window start]--> Closed
//! ```
//!
//! Every raw event counts, including ones later dropped by other filters.

use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_LOOP_WINDOW: Duration = Duration::from_secs(1);
pub const DEFAULT_LOOP_CEILING: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct LoopBreakerConfig {
    /// Rolling window length.
    pub window: Duration,
    /// Events allowed per window.
    pub ceiling: u32,
}

impl Default for LoopBreakerConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_LOOP_WINDOW,
            ceiling: DEFAULT_LOOP_CEILING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Tripped,
}

#[derive(Debug)]
pub struct LoopBreaker {
    config: LoopBreakerConfig,
    window_start: Option<Instant>,
    count: u32,
    state: BreakerState,
}

impl LoopBreaker {
    pub fn new(config: LoopBreakerConfig) -> Self {
        Self {
            config,
            window_start: None,
            count: 0,
            state: BreakerState::Closed,
        }
    }

    /// Count an event at `now`. Returns false if it must be suppressed.
    pub fn record(&mut self, now: Instant) -> bool {
        let in_window = self
            .window_start
            .is_some_and(|start| now.duration_since(start) < self.config.window);

        if !in_window {
            if self.state == BreakerState::Tripped {
                tracing::info!("Viewport loop breaker closed");
            }
            self.window_start = Some(now);
            self.count = 0;
            self.state = BreakerState::Closed;
        }

        self.count += 1;
        if self.count <= self.config.ceiling {
            return true;
        }

        if self.state == BreakerState::Closed {
            tracing::warn!(
                events = self.count,
                window_ms = self.config.window.as_millis() as u64,
                "Viewport update loop detected, suppressing events"
            );
            self.state = BreakerState::Tripped;
        }
        false
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Events counted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.window_start = None;
        self.count = 0;
        self.state = BreakerState::Closed;
    }
}
