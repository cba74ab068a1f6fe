//! User-facing notices.
//!
//! The presentation layer lives outside this crate. Components that must
//! tell the user something (permission denied, recovery gave up) build a
//! [`Notice`] and hand it to a [`Presenter`].

use serde::Serialize;

/// An action the user can take from a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeAction {
    Dismiss,
    OpenSettings,
    Retry,
    ContinueOffline,
}

impl NoticeAction {
    pub fn label(&self) -> &'static str {
        match self {
            NoticeAction::Dismiss => "OK",
            NoticeAction::OpenSettings => "Open settings",
            NoticeAction::Retry => "Retry",
            NoticeAction::ContinueOffline => "Continue offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
    pub actions: Vec<NoticeAction>,
}

impl Notice {
    /// A notice with a single dismiss action.
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            actions: vec![NoticeAction::Dismiss],
        }
    }

    pub fn with_actions(mut self, actions: Vec<NoticeAction>) -> Self {
        self.actions = actions;
        self
    }
}

/// Callback contract to the presentation layer.
pub trait Presenter: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Presenter that only logs. Used by the CLI and headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn notify(&self, notice: Notice) {
        let actions: Vec<&str> = notice.actions.iter().map(NoticeAction::label).collect();
        tracing::warn!(
            title = %notice.title,
            actions = ?actions,
            "{}",
            notice.message
        );
    }
}
