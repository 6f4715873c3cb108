//! Board state store and the synchronous half of the status-change protocol.
//!
//! [`BoardState`] owns the loaded task snapshot, the status each task last
//! had according to the server, the set of tasks with a status change in
//! flight, and the count of outstanding saves. Every transition here is
//! synchronous; the async driver in [`super::reconciler`] only performs the
//! remote calls the transitions ask for.

use std::collections::{HashMap, HashSet};

use kanban_proto::task::{Task, TaskId, TaskPatch, TaskStatus};

/// Why a status change request was turned away before doing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A status change for this task is already in flight.
    AlreadyUpdating,
    /// The task is not on the board.
    NotFound,
    /// The task already has the requested status.
    Unchanged,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyUpdating => write!(f, "already updating"),
            Self::NotFound => write!(f, "not found"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// An accepted status change, from optimistic apply until it settles.
///
/// Holding one means the task is locked and counted as a pending save.
/// Pass it back to [`BoardState::finish_status_change`] exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a status change keeps its task locked until it is finished"]
pub struct StatusChange {
    /// Task being moved.
    pub task_id: TaskId,
    /// Visible status before the optimistic apply.
    pub from: TaskStatus,
    /// Requested status.
    pub to: TaskStatus,
    /// Last server-confirmed status; the rollback target.
    pub confirmed: TaskStatus,
}

impl StatusChange {
    /// Returns the patch to send to the repository.
    #[must_use]
    pub fn patch(&self) -> TaskPatch {
        TaskPatch::status(self.to.clone())
    }
}

/// Result of settling a [`StatusChange`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settled {
    /// Whether the remote update succeeded.
    pub succeeded: bool,
    /// Whether a full refresh may be issued now: the update succeeded and
    /// no other save is outstanding.
    pub refresh_allowed: bool,
}

/// Loaded tasks plus the bookkeeping for optimistic status changes.
#[derive(Debug, Clone, Default)]
pub struct BoardState {
    tasks: Vec<Task>,
    confirmed: HashMap<TaskId, TaskStatus>,
    in_flight: HashSet<TaskId>,
    pending_saves: usize,
}

impl BoardState {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- store operations ---

    /// Replaces the whole snapshot and re-derives every confirmed status from it.
    pub fn load(&mut self, tasks: Vec<Task>) {
        self.confirmed = tasks
            .iter()
            .map(|t| (t.id.clone(), t.status.clone()))
            .collect();
        self.tasks = tasks;
    }

    /// Sets the visible status of one task without touching its confirmed status.
    ///
    /// Returns `false` if the task is not on the board.
    pub fn apply_optimistic(&mut self, id: &TaskId, status: TaskStatus) -> bool {
        self.set_status(id, status)
    }

    /// Restores the visible status of one task to `confirmed`.
    ///
    /// Returns `false` if the task is not on the board.
    pub fn rollback(&mut self, id: &TaskId, confirmed: TaskStatus) -> bool {
        self.set_status(id, confirmed)
    }

    /// Records `status` as the server-confirmed status of `id`.
    pub fn confirm(&mut self, id: &TaskId, status: TaskStatus) {
        self.confirmed.insert(id.clone(), status);
    }

    /// Drops a task whose deletion the server confirmed.
    pub fn remove_confirmed(&mut self, id: &TaskId) -> Option<Task> {
        self.confirmed.remove(id);
        let index = self.tasks.iter().position(|t| t.id == *id)?;
        Some(self.tasks.remove(index))
    }

    /// Inserts or replaces a task exactly as the server returned it.
    ///
    /// Existing tasks keep their position; new ones are appended. If a status
    /// change for the task is in flight, its optimistic status stays visible
    /// and only the confirmed status is updated.
    pub fn upsert_confirmed(&mut self, mut task: Task) {
        self.confirmed.insert(task.id.clone(), task.status.clone());
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => {
                if self.in_flight.contains(&task.id) {
                    task.status = existing.status.clone();
                }
                *existing = task;
            }
            None => self.tasks.push(task),
        }
    }

    fn set_status(&mut self, id: &TaskId, status: TaskStatus) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == *id) {
            Some(task) => {
                task.status = status;
                true
            }
            None => false,
        }
    }

    // --- status change protocol ---

    /// Starts a status change: lock, remember the rollback target, apply
    /// optimistically and count the save.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] (and changes nothing) if the task is already
    /// locked, not on the board, or already has `to` as its status.
    pub fn begin_status_change(
        &mut self,
        id: &TaskId,
        to: TaskStatus,
    ) -> Result<StatusChange, Rejection> {
        if self.in_flight.contains(id) {
            return Err(Rejection::AlreadyUpdating);
        }
        let from = self.task(id).ok_or(Rejection::NotFound)?.status.clone();
        if from == to {
            return Err(Rejection::Unchanged);
        }

        self.in_flight.insert(id.clone());
        let confirmed = self
            .confirmed
            .get(id)
            .cloned()
            .unwrap_or_else(|| from.clone());
        self.apply_optimistic(id, to.clone());
        self.pending_saves += 1;

        Ok(StatusChange {
            task_id: id.clone(),
            from,
            to,
            confirmed,
        })
    }

    /// Settles a status change: confirm or roll back, unlock, uncount.
    pub fn finish_status_change(&mut self, change: StatusChange, succeeded: bool) -> Settled {
        let StatusChange {
            task_id,
            to,
            confirmed,
            ..
        } = change;

        if succeeded {
            self.confirm(&task_id, to);
        } else {
            self.rollback(&task_id, confirmed);
        }
        self.in_flight.remove(&task_id);
        self.pending_saves = self.pending_saves.saturating_sub(1);

        Settled {
            succeeded,
            refresh_allowed: succeeded && self.pending_saves == 0,
        }
    }

    /// Loads fetched tasks unless a save started while they were being fetched.
    ///
    /// Returns `true` if the snapshot was replaced.
    pub fn commit_refresh(&mut self, tasks: Vec<Task>) -> bool {
        if self.pending_saves > 0 {
            return false;
        }
        self.load(tasks);
        true
    }

    // --- accessors ---

    /// All loaded tasks in snapshot order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Looks up a task by ID.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *id)
    }

    /// Looks up a task by its human-readable key (case-insensitive).
    #[must_use]
    pub fn task_by_key(&self, key: &str) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|t| t.key.eq_ignore_ascii_case(key.trim()))
    }

    /// Last server-confirmed status of a task.
    #[must_use]
    pub fn confirmed_status(&self, id: &TaskId) -> Option<&TaskStatus> {
        self.confirmed.get(id)
    }

    /// Whether a status change for `id` is in flight.
    #[must_use]
    pub fn is_in_flight(&self, id: &TaskId) -> bool {
        self.in_flight.contains(id)
    }

    /// Number of tasks with a status change in flight.
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of outstanding saves.
    #[must_use]
    pub const fn pending_saves(&self) -> usize {
        self.pending_saves
    }

    /// Whether any save is outstanding.
    #[must_use]
    pub const fn is_saving(&self) -> bool {
        self.pending_saves > 0
    }
}
