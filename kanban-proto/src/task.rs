//! Task model for the Kanban board.
//!
//! Defines the [`Task`] entity, its workflow [`TaskStatus`], the creation
//! payload ([`NewTask`]), partial updates ([`TaskPatch`]) and the scope
//! filter used when listing tasks ([`TaskFilter`]). Field validation rules
//! live here so both the board and the store enforce the same limits.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::project::ProjectId;

/// Minimum task title length in characters (after trimming).
pub const MIN_TITLE_LENGTH: usize = 3;

/// Maximum task title length in characters (after trimming).
pub const MAX_TITLE_LENGTH: usize = 500;

/// Maximum task description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Largest accepted story-point estimate.
pub const MAX_STORY_POINTS: u16 = 999;

/// Largest accepted hour estimate.
pub const MAX_ESTIMATED_HOURS: f64 = 9999.0;

/// Returns the current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
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

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string does not name a known enum value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseValueError {
    /// Which kind of value was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Workflow status of a task.
///
/// The five known statuses are ordered the way board columns are laid out.
/// Any other string coming back from storage is kept verbatim in
/// [`TaskStatus::Unrecognized`] instead of failing deserialization, so a
/// client running against a newer schema still shows every task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    /// Not started.
    ToDo,
    /// Actively being worked on.
    InProgress,
    /// Waiting for review.
    Review,
    /// Under test.
    Test,
    /// Finished.
    Done,
    /// A status value this client does not know about.
    Unrecognized(String),
}

impl TaskStatus {
    /// Known statuses in board column order.
    pub const COLUMNS: [Self; 5] = [
        Self::ToDo,
        Self::InProgress,
        Self::Review,
        Self::Test,
        Self::Done,
    ];

    /// Returns the storage name of this status (`to_do`, `in_progress`, ...).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ToDo => "to_do",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Test => "test",
            Self::Done => "done",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Returns the human-readable column label.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::ToDo => "To Do",
            Self::InProgress => "In Progress",
            Self::Review => "Review",
            Self::Test => "Test",
            Self::Done => "Done",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Returns `true` unless this is an [`Unrecognized`](Self::Unrecognized) value.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<&str> for TaskStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "to_do" => Self::ToDo,
            "in_progress" => Self::InProgress,
            "review" => Self::Review,
            "test" => Self::Test,
            "done" => Self::Done,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for TaskStatus {
    fn from(raw: String) -> Self {
        match Self::from(raw.as_str()) {
            Self::Unrecognized(_) => Self::Unrecognized(raw),
            known => known,
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Can wait.
    Low,
    /// The default when nothing else was chosen.
    #[default]
    Medium,
    /// Should be picked up soon.
    High,
    /// Drop everything.
    Critical,
}

impl TaskPriority {
    /// All priorities from lowest to highest.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Returns the storage name of this priority.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseValueError {
                kind: "priority",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// A plain task.
    #[default]
    Task,
    /// A defect.
    Bug,
    /// A user story.
    Story,
    /// A large body of work spanning several stories.
    Epic,
}

impl TaskType {
    /// All task types.
    pub const ALL: [Self; 4] = [Self::Task, Self::Bug, Self::Story, Self::Epic];

    /// Returns the storage name of this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Story => "story",
            Self::Epic => "epic",
        }
    }
}

impl FromStr for TaskType {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseValueError {
                kind: "task type",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// Human-readable key such as `ALPHA-12`.
    pub key: String,
    /// Project this task belongs to.
    pub project_id: ProjectId,
    /// Sprint the task is planned into, if any.
    pub sprint_id: Option<String>,
    /// Backlog the task sits in, if any.
    pub backlog_id: Option<String>,
    /// Short summary.
    pub title: String,
    /// Longer free-form description.
    pub description: Option<String>,
    /// Current workflow status.
    pub status: TaskStatus,
    /// Priority.
    pub priority: TaskPriority,
    /// Kind of work item.
    pub task_type: TaskType,
    /// Story-point estimate.
    pub story_points: Option<u16>,
    /// Hour estimate.
    pub estimated_hours: Option<f64>,
    /// Due date.
    pub due_date: Option<NaiveDate>,
    /// Free-text tags.
    pub tags: BTreeSet<String>,
    /// Assigned user.
    pub assignee_id: Option<String>,
    /// User who reported the task.
    pub reporter_id: Option<String>,
    /// Creation time (milliseconds since epoch).
    pub created_at: u64,
    /// Last modification time (milliseconds since epoch).
    pub updated_at: u64,
    /// Soft-delete marker; a deleted task is absent from all reads.
    pub deleted_at: Option<u64>,
}

impl Task {
    /// Returns `true` if the task has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Errors produced when validating task fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Title is shorter than the minimum after trimming.
    #[error("title must be at least {} characters", MIN_TITLE_LENGTH)]
    TitleTooShort,
    /// Title exceeds the maximum length.
    #[error("title must be at most {} characters", MAX_TITLE_LENGTH)]
    TitleTooLong,
    /// Description exceeds the maximum length.
    #[error("description is too long (max {} characters)", MAX_DESCRIPTION_LENGTH)]
    DescriptionTooLong,
    /// Story points are outside `0..=999`.
    #[error("story points must be a whole number between 0 and {}", MAX_STORY_POINTS)]
    StoryPointsOutOfRange(u16),
    /// Hour estimate is negative, too large or not a number.
    #[error("estimated hours must be between 0 and {}", MAX_ESTIMATED_HOURS)]
    EstimatedHoursOutOfRange,
    /// A tag is empty or whitespace-only.
    #[error("tags cannot be empty")]
    EmptyTag,
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    let len = title.trim().chars().count();
    if len < MIN_TITLE_LENGTH {
        return Err(ValidationError::TitleTooShort);
    }
    if len > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong);
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<(), ValidationError> {
    match description {
        Some(text) if text.trim().chars().count() > MAX_DESCRIPTION_LENGTH => {
            Err(ValidationError::DescriptionTooLong)
        }
        _ => Ok(()),
    }
}

fn validate_story_points(points: Option<u16>) -> Result<(), ValidationError> {
    match points {
        Some(p) if p > MAX_STORY_POINTS => Err(ValidationError::StoryPointsOutOfRange(p)),
        _ => Ok(()),
    }
}

fn validate_estimated_hours(hours: Option<f64>) -> Result<(), ValidationError> {
    match hours {
        Some(h) if !h.is_finite() || !(0.0..=MAX_ESTIMATED_HOURS).contains(&h) => {
            Err(ValidationError::EstimatedHoursOutOfRange)
        }
        _ => Ok(()),
    }
}

fn validate_tags(tags: &BTreeSet<String>) -> Result<(), ValidationError> {
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(ValidationError::EmptyTag);
    }
    Ok(())
}

/// Trims a description and maps blank text to `None`.
fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// Payload for creating a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    /// Project to create the task in.
    pub project_id: ProjectId,
    /// Short summary.
    pub title: String,
    /// Longer free-form description.
    pub description: Option<String>,
    /// Initial status.
    pub status: TaskStatus,
    /// Priority.
    pub priority: TaskPriority,
    /// Kind of work item.
    pub task_type: TaskType,
    /// Story-point estimate.
    pub story_points: Option<u16>,
    /// Hour estimate.
    pub estimated_hours: Option<f64>,
    /// Due date.
    pub due_date: Option<NaiveDate>,
    /// Free-text tags.
    pub tags: BTreeSet<String>,
    /// Assigned user.
    pub assignee_id: Option<String>,
    /// Reporting user.
    pub reporter_id: Option<String>,
    /// Sprint to plan the task into.
    pub sprint_id: Option<String>,
    /// Backlog to file the task in.
    pub backlog_id: Option<String>,
}

impl NewTask {
    /// Creates a payload with the given title and default attributes.
    pub fn new(project_id: ProjectId, title: impl Into<String>) -> Self {
        Self {
            project_id,
            title: title.into(),
            description: None,
            status: TaskStatus::ToDo,
            priority: TaskPriority::default(),
            task_type: TaskType::default(),
            story_points: None,
            estimated_hours: None,
            due_date: None,
            tags: BTreeSet::new(),
            assignee_id: None,
            reporter_id: None,
            sprint_id: None,
            backlog_id: None,
        }
    }

    /// Validates every field of the payload.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] for the first invalid field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        validate_description(self.description.as_deref())?;
        validate_story_points(self.story_points)?;
        validate_estimated_hours(self.estimated_hours)?;
        validate_tags(&self.tags)
    }

    /// Builds the stored [`Task`] for this payload.
    ///
    /// The title is trimmed and a blank description becomes `None`.
    #[must_use]
    pub fn into_task(self, key: String, now: u64) -> Task {
        Task {
            id: TaskId::new(),
            key,
            project_id: self.project_id,
            sprint_id: self.sprint_id,
            backlog_id: self.backlog_id,
            title: self.title.trim().to_string(),
            description: normalize_description(self.description),
            status: self.status,
            priority: self.priority,
            task_type: self.task_type,
            story_points: self.story_points,
            estimated_hours: self.estimated_hours,
            due_date: self.due_date,
            tags: self.tags,
            assignee_id: self.assignee_id,
            reporter_id: self.reporter_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// A partial update to a task.
///
/// `None` leaves a field untouched. Nullable fields use a nested option:
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<Option<String>>,
    /// New status.
    pub status: Option<TaskStatus>,
    /// New priority.
    pub priority: Option<TaskPriority>,
    /// New task type.
    pub task_type: Option<TaskType>,
    /// New story-point estimate.
    pub story_points: Option<Option<u16>>,
    /// New hour estimate.
    pub estimated_hours: Option<Option<f64>>,
    /// New due date.
    pub due_date: Option<Option<NaiveDate>>,
    /// Replacement tag set.
    pub tags: Option<BTreeSet<String>>,
    /// New assignee.
    pub assignee_id: Option<Option<String>>,
    /// New sprint.
    pub sprint_id: Option<Option<String>>,
    /// New backlog.
    pub backlog_id: Option<Option<String>>,
}

impl TaskPatch {
    /// Creates a patch that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Validates the fields present in the patch.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] for the first invalid field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(description) = &self.description {
            validate_description(description.as_deref())?;
        }
        if let Some(points) = self.story_points {
            validate_story_points(points)?;
        }
        if let Some(hours) = self.estimated_hours {
            validate_estimated_hours(hours)?;
        }
        if let Some(tags) = &self.tags {
            validate_tags(tags)?;
        }
        Ok(())
    }

    /// Writes every field present in the patch onto `task`.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            task.description = normalize_description(description.clone());
        }
        if let Some(status) = &self.status {
            task.status = status.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(task_type) = self.task_type {
            task.task_type = task_type;
        }
        if let Some(points) = self.story_points {
            task.story_points = points;
        }
        if let Some(hours) = self.estimated_hours {
            task.estimated_hours = hours;
        }
        if let Some(due) = self.due_date {
            task.due_date = due;
        }
        if let Some(tags) = &self.tags {
            task.tags.clone_from(tags);
        }
        if let Some(assignee) = &self.assignee_id {
            task.assignee_id.clone_from(assignee);
        }
        if let Some(sprint) = &self.sprint_id {
            task.sprint_id.clone_from(sprint);
        }
        if let Some(backlog) = &self.backlog_id {
            task.backlog_id.clone_from(backlog);
        }
    }
}

/// Scope filter for listing tasks.
///
/// Every present criterion must match. Empty identifier strings are treated
/// as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Only tasks in this project.
    pub project_id: Option<ProjectId>,
    /// Only tasks in this sprint.
    pub sprint_id: Option<String>,
    /// Only tasks in this backlog.
    pub backlog_id: Option<String>,
    /// Only tasks assigned to this user.
    pub assignee_id: Option<String>,
    /// Only tasks with this status.
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    /// Creates a filter scoped to one project.
    #[must_use]
    pub fn project(project_id: ProjectId) -> Self {
        Self {
            project_id: Some(project_id),
            ..Self::default()
        }
    }

    /// Returns `true` if `task` is live and satisfies every criterion.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        fn wanted(criterion: Option<&String>) -> Option<&str> {
            criterion.map(String::as_str).filter(|s| !s.is_empty())
        }
        fn same(criterion: Option<&String>, value: Option<&String>) -> bool {
            wanted(criterion).is_none_or(|w| value.is_some_and(|v| v == w))
        }

        !task.is_deleted()
            && self.project_id.as_ref().is_none_or(|p| *p == task.project_id)
            && same(self.sprint_id.as_ref(), task.sprint_id.as_ref())
            && same(self.backlog_id.as_ref(), task.backlog_id.as_ref())
            && same(self.assignee_id.as_ref(), task.assignee_id.as_ref())
            && self.status.as_ref().is_none_or(|s| *s == task.status)
    }
}
