//! Kanban board core.
//!
//! [`state::BoardState`] holds the loaded tasks and the bookkeeping for
//! optimistic status changes, [`reconciler::BoardController`] drives it
//! against a [`kanban_proto::repository::TaskRepository`], and
//! [`view::project`] turns a snapshot into columns for rendering.

pub mod events;
pub mod reconciler;
pub mod state;
pub mod view;

use std::time::Duration;

use kanban_proto::repository::RepositoryError;
use kanban_proto::task::{TaskId, ValidationError};

pub use events::BoardEvents;
pub use reconciler::{BoardController, RefreshOutcome, StatusChangeOutcome};
pub use state::{BoardState, Rejection, Settled, StatusChange};
pub use view::{BoardQuery, BoardView, Column, PriorityFilter};

/// Shown when a status update or task edit fails.
pub const UPDATE_FAILED: &str = "Failed to update task.";
/// Shown when the refresh after a save fails.
pub const REFRESH_FAILED: &str = "Failed to refresh tasks.";
/// Shown when an explicit board load fails.
pub const LOAD_FAILED: &str = "Failed to load tasks.";
/// Shown when a delete fails.
pub const DELETE_FAILED: &str = "Failed to delete task.";
/// Shown when a create fails.
pub const CREATE_FAILED: &str = "Failed to create task.";

/// Errors returned by board mutations other than status changes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoardError {
    /// A status change for the task is in flight.
    #[error("task {0} is already being updated")]
    AlreadyUpdating(TaskId),

    /// The task is not on the board.
    #[error("task not on board: {0}")]
    NotFound(TaskId),

    /// Local validation rejected the input before any remote call.
    #[error("invalid task: {0}")]
    Validation(#[from] ValidationError),

    /// The repository call failed.
    #[error("remote call failed: {0}")]
    Remote(#[from] RepositoryError),

    /// The repository call did not finish within the lock timeout.
    #[error("remote call timed out after {0:?}")]
    TimedOut(Duration),
}

/// Severity of a user-facing [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Confirmation of a completed action.
    Info,
    /// Something went wrong but the board is still consistent.
    Warning,
    /// An action failed and was undone or not applied.
    Error,
}

/// A user-facing message, shown as a toast or printed to stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Text shown to the user.
    pub message: String,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        write!(f, "{tag}: {}", self.message)
    }
}

/// Events emitted by a [`BoardController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    /// The board snapshot changed and should be re-rendered.
    Changed,
    /// A notice for the user.
    Notice(Notice),
}
