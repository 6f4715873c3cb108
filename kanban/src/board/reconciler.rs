//! Async driver for board mutations.
//!
//! [`BoardController`] runs the status-change protocol of
//! [`BoardState`] against a [`TaskRepository`]: apply optimistically, call
//! the repository, then confirm or roll back and refresh only when no other
//! save is outstanding. Board state sits behind a synchronous mutex that is
//! never held across an `.await`.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;

use kanban_proto::repository::{RepositoryError, TaskRepository};
use kanban_proto::task::{NewTask, Task, TaskFilter, TaskId, TaskPatch, TaskStatus};

use super::events::{self, BoardEvents, EventSender};
use super::state::{BoardState, Rejection, Settled, StatusChange};
use super::{
    BoardError, CREATE_FAILED, DELETE_FAILED, LOAD_FAILED, Notice, NoticeLevel,
    REFRESH_FAILED, UPDATE_FAILED,
};

/// What happened to a board refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fetched tasks replaced the snapshot.
    Applied,
    /// The fetch finished while a save was outstanding and was dropped.
    Discarded,
    /// No fetch was issued because other saves were still outstanding.
    Skipped,
    /// The fetch failed; the snapshot is unchanged.
    Failed,
}

/// What happened to a status change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChangeOutcome {
    /// Nothing was done.
    Rejected(Rejection),
    /// The server accepted the change.
    Committed {
        /// Result of the follow-up refresh.
        refresh: RefreshOutcome,
    },
    /// The server call failed or timed out; the task is back at its
    /// confirmed status.
    RolledBack,
}

/// Drives board mutations against a repository and reports back through
/// [`BoardEvents`].
pub struct BoardController<R> {
    repo: R,
    scope: TaskFilter,
    state: Mutex<BoardState>,
    events: EventSender,
    lock_timeout: Option<Duration>,
}

impl<R> std::fmt::Debug for BoardController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardController")
            .field("scope", &self.scope)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl<R: TaskRepository> BoardController<R> {
    /// Creates a controller over an empty board.
    ///
    /// Returns the controller and the [`BoardEvents`] the UI layer should
    /// consume. Notices are kept until read; redraw hints are coalesced.
    pub fn new(repo: R, scope: TaskFilter) -> (Self, BoardEvents) {
        let (events, receiver) = events::channel();
        let controller = Self {
            repo,
            scope,
            state: Mutex::new(BoardState::new()),
            events,
            lock_timeout: None,
        };
        (controller, receiver)
    }

    /// Bounds every remote mutation; a call that exceeds `timeout` counts as failed.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// The filter used for every fetch.
    #[must_use]
    pub const fn scope(&self) -> &TaskFilter {
        &self.scope
    }

    /// The underlying repository.
    #[must_use]
    pub const fn repository(&self) -> &R {
        &self.repo
    }

    /// Returns a copy of the current board state.
    #[must_use]
    pub fn snapshot(&self) -> BoardState {
        self.state.lock().clone()
    }

    /// Runs `f` against the current board state without copying it.
    pub fn with_state<T>(&self, f: impl FnOnce(&BoardState) -> T) -> T {
        f(&self.state.lock())
    }

    // --- loading ---

    /// Fetches the board scope and loads it unless a save is outstanding.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.fetch_and_commit(LOAD_FAILED).await
    }

    async fn fetch_and_commit(&self, failure_message: &str) -> RefreshOutcome {
        match self.repo.list_tasks(&self.scope).await {
            Ok(tasks) => {
                let count = tasks.len();
                let applied = self.state.lock().commit_refresh(tasks);
                if applied {
                    tracing::debug!(tasks = count, "board refreshed");
                    self.events.changed();
                    RefreshOutcome::Applied
                } else {
                    tracing::debug!("refresh discarded, a save started while fetching");
                    RefreshOutcome::Discarded
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch tasks");
                self.notify(NoticeLevel::Warning, failure_message);
                RefreshOutcome::Failed
            }
        }
    }

    // --- status changes ---

    /// Moves a task to `status` optimistically and reconciles with the server.
    ///
    /// The new status is visible as soon as this is called. If the server
    /// rejects the change (or the call times out or is dropped) the task
    /// returns to its last confirmed status and an error notice is emitted.
    /// On success the board is refreshed, but only if no other status change
    /// is still outstanding.
    pub async fn request_status_change(&self, id: &TaskId, status: TaskStatus) -> StatusChangeOutcome {
        let begun = self.state.lock().begin_status_change(id, status);
        let change = match begun {
            Ok(change) => change,
            Err(rejection) => {
                tracing::debug!(task = %id, %rejection, "status change not started");
                return StatusChangeOutcome::Rejected(rejection);
            }
        };
        tracing::debug!(task = %id, from = %change.from, to = %change.to, "status applied optimistically");
        self.events.changed();

        let patch = change.patch();
        let to = change.to.clone();
        let pending = PendingChange::new(&self.state, change);
        let result = self.bounded(self.repo.update_task(id, patch)).await;

        let settled = pending.settle(result.is_ok());
        self.events.changed();
        if let Err(e) = result {
            tracing::warn!(task = %id, error = %e, "status update failed, rolled back");
            self.notify(NoticeLevel::Error, UPDATE_FAILED);
            return StatusChangeOutcome::RolledBack;
        }
        tracing::info!(task = %id, status = %to, "status change confirmed");

        let refresh = if settled.refresh_allowed {
            self.fetch_and_commit(REFRESH_FAILED).await
        } else {
            tracing::debug!("refresh skipped, other saves outstanding");
            RefreshOutcome::Skipped
        };
        StatusChangeOutcome::Committed { refresh }
    }

    // --- other mutations ---

    /// Deletes a task, drops it from the board and refreshes.
    ///
    /// # Errors
    ///
    /// Returns `BoardError::Remote` or `BoardError::TimedOut` if the
    /// repository call fails; the board is left unchanged.
    pub async fn delete_task(&self, id: &TaskId) -> Result<(), BoardError> {
        if let Err(e) = self.bounded(self.repo.delete_task(id)).await {
            tracing::warn!(task = %id, error = %e, "delete failed");
            self.notify(NoticeLevel::Error, DELETE_FAILED);
            return Err(e);
        }
        self.state.lock().remove_confirmed(id);
        tracing::info!(task = %id, "task deleted");
        self.events.changed();
        self.notify(NoticeLevel::Info, "Task deleted.");
        self.fetch_and_commit(REFRESH_FAILED).await;
        Ok(())
    }

    /// Creates a task and adds it to the board if it falls in scope.
    ///
    /// # Errors
    ///
    /// Returns `BoardError::Validation` without calling the repository if
    /// `new` is invalid, or `BoardError::Remote`/`BoardError::TimedOut` if
    /// the repository call fails.
    pub async fn create_task(&self, new: NewTask) -> Result<Task, BoardError> {
        new.validate()?;
        let task = match self.bounded(self.repo.create_task(new)).await {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(error = %e, "create failed");
                self.notify(NoticeLevel::Error, CREATE_FAILED);
                return Err(e);
            }
        };
        if self.scope.matches(&task) {
            self.state.lock().upsert_confirmed(task.clone());
            self.events.changed();
        }
        tracing::info!(task = %task.id, key = %task.key, "task created");
        self.notify(NoticeLevel::Info, "Task created.");
        self.fetch_and_commit(REFRESH_FAILED).await;
        Ok(task)
    }

    /// Applies a non-optimistic edit to a task on the board.
    ///
    /// # Errors
    ///
    /// Returns `BoardError::Validation` for an invalid patch,
    /// `BoardError::NotFound` if the task is not on the board,
    /// `BoardError::AlreadyUpdating` while a status change for it is in
    /// flight, or `BoardError::Remote`/`BoardError::TimedOut` if the
    /// repository call fails.
    pub async fn edit_task(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, BoardError> {
        patch.validate()?;
        let ready = {
            let state = self.state.lock();
            if state.task(id).is_none() {
                Err(BoardError::NotFound(id.clone()))
            } else if state.is_in_flight(id) {
                Err(BoardError::AlreadyUpdating(id.clone()))
            } else {
                Ok(())
            }
        };
        ready?;

        let task = match self.bounded(self.repo.update_task(id, patch)).await {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(task = %id, error = %e, "edit failed");
                self.notify(NoticeLevel::Error, UPDATE_FAILED);
                return Err(e);
            }
        };
        {
            let mut state = self.state.lock();
            if self.scope.matches(&task) {
                state.upsert_confirmed(task.clone());
            } else {
                state.remove_confirmed(id);
            }
        }
        tracing::info!(task = %id, "task updated");
        self.events.changed();
        self.notify(NoticeLevel::Info, "Task updated.");
        self.fetch_and_commit(REFRESH_FAILED).await;
        Ok(task)
    }

    // --- helpers ---

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, BoardError> {
        match self.lock_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(BoardError::from),
                Err(_) => Err(BoardError::TimedOut(limit)),
            },
            None => call.await.map_err(BoardError::from),
        }
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        self.events.notice(Notice {
            level,
            message: message.to_string(),
        });
    }
}

/// A started status change that settles as failed if dropped unsettled,
/// so a cancelled request still unlocks its task and rolls it back.
struct PendingChange<'a> {
    state: &'a Mutex<BoardState>,
    change: Option<StatusChange>,
}

impl<'a> PendingChange<'a> {
    const fn new(state: &'a Mutex<BoardState>, change: StatusChange) -> Self {
        Self {
            state,
            change: Some(change),
        }
    }

    fn settle(mut self, succeeded: bool) -> Settled {
        self.change.take().map_or_else(Settled::default, |change| {
            self.state.lock().finish_status_change(change, succeeded)
        })
    }
}

impl Drop for PendingChange<'_> {
    fn drop(&mut self) {
        if let Some(change) = self.change.take() {
            tracing::warn!(task = %change.task_id, "status change abandoned, rolling back");
            let _ = self.state.lock().finish_status_change(change, false);
        }
    }
}
