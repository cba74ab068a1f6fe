//! Error Recovery Engine
//!
//! Every failure the layer cannot handle locally ends up here as a
//! [`Failure`] plus an [`ErrorContext`]. The engine classifies it, records
//! it in a bounded history and, for critical classes, runs a bounded
//! class-specific recovery strategy:
//!
//! | Class | Strategy |
//! |---|---|
//! | Network | offline mode if disconnected, else retry the operation |
//! | Location | last known location, else the default region |
//! | DataCorruption | salvage the stored value, else delete the key |
//! | Api(Auth) | refresh credentials |
//! | Api(RateLimit) | wait, then report success |
//! | Api(Generic) | serve the cached copy |
//! | Map | publish a reset to the simplified viewport |
//! | Sync | reset all offline state |
//!
//! When a strategy runs out of attempts the engine applies a permanent
//! fallback and always notifies the user.

mod classify;
mod engine;
mod failure;
mod repair;
mod strategy;

pub use classify::{
    api_failure_for_status, classify, matching_rule, ApiFailure, ClassificationRule, ErrorClass,
    CLASSIFICATION_RULES,
};
pub use engine::{
    CredentialRefresher, ErrorRecord, ErrorRecoveryEngine, RecoveryConfig, RecoveryEvent,
    RecoveryOutcome, RecoveryStats, Resolution, DEFAULT_ERROR_HISTORY_CAPACITY,
    DEFAULT_RATE_LIMIT_WAIT,
};
pub use failure::{ErrorContext, Failure, RetryOperation, ServiceHint};
pub use repair::{plan_repair, RepairPlan};
pub use strategy::StrategyRecord;
