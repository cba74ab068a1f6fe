//! Replay of queued actions during sync.

use futures::future::BoxFuture;
use thiserror::Error;

use super::action::PendingAction;

/// Why a queued action could not be replayed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    /// The remote side could not be reached.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The remote side refused the action.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The remote state moved on; replaying again cannot succeed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The stored payload does not decode.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Sends one kind of pending action to the remote system.
///
/// Registered per [`super::ActionType`] on the [`super::OfflineQueue`].
pub trait ActionHandler: Send + Sync {
    fn handle<'a>(&'a self, action: &'a PendingAction) -> BoxFuture<'a, Result<(), ActionError>>;
}
