//! Map Viewport Controller
//!
//! Turns the raw stream of map region changes into a calm stream of
//! meaningful viewport updates. Guards against update feedback loops,
//! ignores changes the app made itself, and debounces user gestures.

mod controller;
mod loop_breaker;
mod types;

pub use controller::{
    ChangeDecision, ViewportController, ViewportControllerConfig, DEFAULT_CENTER_THRESHOLD_DEG,
    DEFAULT_DEBOUNCE, DEFAULT_SPAN_THRESHOLD_DEG,
};
pub use loop_breaker::{
    BreakerState, LoopBreaker, LoopBreakerConfig, DEFAULT_LOOP_CEILING, DEFAULT_LOOP_WINDOW,
};
pub use types::{
    ChangeOrigin, Viewport, ViewportChange, DEFAULT_LATITUDE_SPAN, DEFAULT_LONGITUDE_SPAN,
};
