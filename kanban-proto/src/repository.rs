//! Persistence contract consumed by the board.
//!
//! The board never inspects a [`RepositoryError`] beyond "it failed"; the
//! variants exist for logging and for callers that talk to a store directly.

use std::future::Future;
use std::sync::Arc;

use crate::project::ProjectId;
use crate::task::{NewTask, Task, TaskFilter, TaskId, TaskPatch, ValidationError};

/// Errors reported by a [`TaskRepository`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// No live task with this ID exists.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// No project with this ID exists.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),
    /// The payload failed validation.
    #[error("invalid task: {0}")]
    Validation(#[from] ValidationError),
    /// The backing storage or transport failed.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Async task storage.
///
/// Every call may fail. Soft-deleted tasks are invisible to all operations:
/// they are never listed and cannot be updated or deleted again.
pub trait TaskRepository: Send + Sync {
    /// Lists all live tasks matching `filter`, in creation order.
    fn list_tasks(
        &self,
        filter: &TaskFilter,
    ) -> impl Future<Output = Result<Vec<Task>, RepositoryError>> + Send;

    /// Applies `patch` to a live task and returns the updated task.
    fn update_task(
        &self,
        id: &TaskId,
        patch: TaskPatch,
    ) -> impl Future<Output = Result<Task, RepositoryError>> + Send;

    /// Soft-deletes a live task and returns it as it was deleted.
    fn delete_task(&self, id: &TaskId) -> impl Future<Output = Result<Task, RepositoryError>> + Send;

    /// Creates a task and returns it with its assigned ID and key.
    fn create_task(&self, new: NewTask)
    -> impl Future<Output = Result<Task, RepositoryError>> + Send;
}

impl<R: TaskRepository> TaskRepository for Arc<R> {
    fn list_tasks(
        &self,
        filter: &TaskFilter,
    ) -> impl Future<Output = Result<Vec<Task>, RepositoryError>> + Send {
        (**self).list_tasks(filter)
    }

    fn update_task(
        &self,
        id: &TaskId,
        patch: TaskPatch,
    ) -> impl Future<Output = Result<Task, RepositoryError>> + Send {
        (**self).update_task(id, patch)
    }

    fn delete_task(&self, id: &TaskId) -> impl Future<Output = Result<Task, RepositoryError>> + Send {
        (**self).delete_task(id)
    }

    fn create_task(
        &self,
        new: NewTask,
    ) -> impl Future<Output = Result<Task, RepositoryError>> + Send {
        (**self).create_task(new)
    }
}
