//! In-memory task store with soft deletion and optional file persistence.
//!
//! [`TaskStore`] keeps every project and task (deleted tasks included) behind
//! a single [`RwLock`]. Task keys are handed out per project while the write
//! lock is held, so concurrent creates never share a key.

use std::path::{Path, PathBuf};

use kanban_proto::codec::{self, CodecError, StoreSnapshot};
use kanban_proto::project::{Project, ProjectId};
use kanban_proto::repository::{RepositoryError, TaskRepository};
use kanban_proto::task::{NewTask, Task, TaskFilter, TaskId, TaskPatch, now_ms};
use tokio::sync::RwLock;

/// Errors raised by store management operations (not by the repository API).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the snapshot file failed.
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        /// File that was accessed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The snapshot file could not be encoded or decoded.
    #[error("snapshot codec error: {0}")]
    Codec(#[from] CodecError),
    /// A project with this key already exists.
    #[error("project key already in use: {0}")]
    DuplicateProject(String),
    /// The project key is empty or only whitespace.
    #[error("project key must not be blank")]
    BlankProjectKey,
}

/// In-memory [`TaskRepository`] implementation.
#[derive(Debug, Default)]
pub struct TaskStore {
    inner: RwLock<StoreSnapshot>,
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the contents of `snapshot`.
    #[must_use]
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Returns a copy of everything in the store.
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.inner.read().await.clone()
    }

    /// Registers a new project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BlankProjectKey`] for an empty key, or
    /// [`StoreError::DuplicateProject`] if the (upper-cased) key is taken.
    pub async fn add_project(&self, key: &str, name: &str) -> Result<Project, StoreError> {
        if key.trim().is_empty() {
            return Err(StoreError::BlankProjectKey);
        }
        let project = Project::new(key, name);
        let mut inner = self.inner.write().await;
        if inner.projects.iter().any(|p| p.key == project.key) {
            return Err(StoreError::DuplicateProject(project.key));
        }
        inner.projects.push(project.clone());
        drop(inner);
        tracing::info!(key = %project.key, id = %project.id, "project created");
        Ok(project)
    }

    /// Looks up a project by key (case-insensitive).
    pub async fn project_by_key(&self, key: &str) -> Option<Project> {
        let inner = self.inner.read().await;
        inner
            .projects
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key.trim()))
            .cloned()
    }

    /// Returns all projects.
    pub async fn projects(&self) -> Vec<Project> {
        self.inner.read().await.projects.clone()
    }

    /// Loads a store from a snapshot file.
    ///
    /// A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read, or
    /// [`StoreError::Codec`] if its contents are not a valid snapshot.
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let snapshot = codec::decode_snapshot(&bytes)?;
                tracing::debug!(
                    path = %path.display(),
                    tasks = snapshot.tasks.len(),
                    "store loaded"
                );
                Ok(Self::from_snapshot(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes the store to `path` atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory or file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = codec::encode_snapshot(&*self.inner.read().await)?;
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "store saved");
        Ok(())
    }
}

/// Returns the live task with `id`, or `NotFound`.
fn live_task_mut<'a>(tasks: &'a mut [Task], id: &TaskId) -> Result<&'a mut Task, RepositoryError> {
    tasks
        .iter_mut()
        .find(|t| t.id == *id && !t.is_deleted())
        .ok_or_else(|| RepositoryError::NotFound(id.clone()))
}

impl TaskRepository for TaskStore {
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, RepositoryError> {
        patch.validate()?;
        let mut inner = self.inner.write().await;
        let task = live_task_mut(&mut inner.tasks, id)?;
        patch.apply_to(task);
        task.updated_at = now_ms();
        tracing::debug!(task = %id, key = %task.key, "task updated");
        Ok(task.clone())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<Task, RepositoryError> {
        let mut inner = self.inner.write().await;
        let task = live_task_mut(&mut inner.tasks, id)?;
        let now = now_ms();
        task.deleted_at = Some(now);
        task.updated_at = now;
        tracing::debug!(task = %id, key = %task.key, "task deleted");
        Ok(task.clone())
    }

    async fn create_task(&self, new: NewTask) -> Result<Task, RepositoryError> {
        new.validate()?;
        let mut inner = self.inner.write().await;
        let project = inner
            .projects
            .iter_mut()
            .find(|p| p.id == new.project_id)
            .ok_or_else(|| RepositoryError::ProjectNotFound(new.project_id.clone()))?;
        let key = project.next_task_key();
        let task = new.into_task(key, now_ms());
        inner.tasks.push(task.clone());
        drop(inner);
        tracing::debug!(key = %task.key, id = %task.id, "task created");
        Ok(task)
    }
}
