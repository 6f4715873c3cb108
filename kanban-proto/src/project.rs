//! Projects group tasks and hand out their human-readable keys.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(Uuid);

impl ProjectId {
    /// Creates a new time-ordered project identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `ProjectId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A project owning a sequence of task keys (`KEY-1`, `KEY-2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project identifier.
    pub id: ProjectId,
    /// Short upper-case key used as the task key prefix.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Number of task keys handed out so far.
    pub task_counter: u32,
}

impl Project {
    /// Creates a project with an upper-cased key and a zero counter.
    pub fn new(key: &str, name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            key: key.trim().to_ascii_uppercase(),
            name: name.into(),
            task_counter: 0,
        }
    }

    /// Advances the counter and returns the next task key.
    pub fn next_task_key(&mut self) -> String {
        self.task_counter = self.task_counter.saturating_add(1);
        format!("{}-{}", self.key, self.task_counter)
    }
}
