//! Subcommands of the `kanban` binary.
//!
//! Every command loads the task store, runs through a [`BoardController`]
//! scoped to one project, prints any notices to the error stream, saves the
//! store if something changed and renders the board.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use futures_util::future::join_all;

use kanban_proto::project::Project;
use kanban_proto::task::{
    NewTask, ParseValueError, TaskFilter, TaskId, TaskPatch, TaskPriority, TaskStatus, TaskType,
};
use kanban_store::{StoreError, TaskStore};

use crate::board::{
    BoardController, BoardError, BoardQuery, PriorityFilter, RefreshOutcome,
    StatusChangeOutcome, view,
};
use crate::config::ClientConfig;
use crate::ui;

/// Errors surfaced to the user by [`run`].
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Loading or saving the task store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A board mutation failed.
    #[error(transparent)]
    Board(#[from] BoardError),

    /// No project exists yet.
    #[error("no projects yet; create one with `kanban init <KEY> <NAME>`")]
    NoProject,

    /// Several projects exist and none was selected.
    #[error("several projects exist ({0}); choose one with --project")]
    AmbiguousProject(String),

    /// The selected project does not exist.
    #[error("unknown project: {0}")]
    UnknownProject(String),

    /// No task on the board has this key.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// Writing output failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// JSON rendering failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a project.
    Init {
        /// Short project key used as the task key prefix (e.g. `ALPHA`).
        key: String,
        /// Display name.
        name: String,
    },

    /// Commands that work on one project's board.
    #[command(flatten)]
    Board(BoardCommand),
}

/// Subcommands that open a project board.
#[derive(clap::Subcommand, Debug, Clone, PartialEq)]
pub enum BoardCommand {
    /// Show the board.
    Board {
        /// Only tasks whose title or key contains this text.
        #[arg(short, long, default_value = "")]
        query: String,
        /// Only tasks with this priority (`all`, `low`, `medium`, `high`, `critical`).
        #[arg(long, default_value = "all")]
        priority: PriorityFilter,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Create a task.
    Create {
        /// Task title.
        title: String,
        /// Longer description.
        #[arg(long)]
        description: Option<String>,
        /// Priority.
        #[arg(long, default_value = "medium")]
        priority: TaskPriority,
        /// Task type.
        #[arg(long = "type", default_value = "task")]
        task_type: TaskType,
        /// Story points.
        #[arg(long)]
        points: Option<u16>,
        /// Estimated hours.
        #[arg(long)]
        hours: Option<f64>,
        /// Tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Assignee user ID.
        #[arg(long)]
        assignee: Option<String>,
    },

    /// Move tasks to new columns, e.g. `ALPHA-1=in_progress ALPHA-2=done`.
    ///
    /// All moves are sent at once; each one succeeds or rolls back on its own.
    Move {
        /// `KEY=STATUS` pairs.
        #[arg(required = true)]
        moves: Vec<MoveArg>,
    },

    /// Edit task details.
    Edit {
        /// Task key.
        key: String,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description; an empty string clears it.
        #[arg(long)]
        description: Option<String>,
        /// New priority.
        #[arg(long)]
        priority: Option<TaskPriority>,
        /// New story points.
        #[arg(long, conflicts_with = "clear_points")]
        points: Option<u16>,
        /// Remove the story point estimate.
        #[arg(long)]
        clear_points: bool,
        /// New assignee; an empty string unassigns.
        #[arg(long)]
        assignee: Option<String>,
    },

    /// Delete a task.
    Delete {
        /// Task key.
        key: String,
    },
}

impl Default for BoardCommand {
    fn default() -> Self {
        Self::Board {
            query: String::new(),
            priority: PriorityFilter::All,
            json: false,
        }
    }
}

/// One `KEY=STATUS` argument of `kanban move`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveArg {
    /// Task key.
    pub key: String,
    /// Target status.
    pub status: TaskStatus,
}

impl FromStr for MoveArg {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseValueError {
            kind: "move (expected KEY=STATUS)",
            value: s.to_string(),
        };
        let (key, status) = s.split_once('=').ok_or_else(invalid)?;
        let (key, status) = (key.trim(), TaskStatus::from(status.trim()));
        if key.is_empty() || !status.is_known() {
            return Err(invalid());
        }
        Ok(Self {
            key: key.to_string(),
            status,
        })
    }
}

/// How the board is shown after a command.
struct Rendering {
    query: BoardQuery,
    json: bool,
    mutated: bool,
}

impl Rendering {
    fn after_mutation(mutated: bool) -> Self {
        Self {
            query: BoardQuery::default(),
            json: false,
            mutated,
        }
    }
}

type Controller = BoardController<Arc<TaskStore>>;

/// Runs one command against the store at `config.data_file`.
///
/// Board output goes to `out`, notices to `err`.
///
/// # Errors
///
/// Returns [`CliError`] if the store cannot be loaded or saved, the project
/// or a task key cannot be resolved, or a mutation fails.
pub async fn run(
    command: Command,
    config: &ClientConfig,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), CliError> {
    let store = Arc::new(TaskStore::load(&config.data_file).await?);

    let command = match command {
        Command::Init { key, name } => {
            let project = store.add_project(&key, &name).await?;
            store.save(&config.data_file).await?;
            writeln!(out, "Created project {} ({})", project.key, project.name)?;
            return Ok(());
        }
        Command::Board(command) => command,
    };

    let project = resolve_project(&store, config.project.as_deref()).await?;
    let (board, mut events) =
        BoardController::new(Arc::clone(&store), TaskFilter::project(project.id.clone()));
    let board = board.with_lock_timeout(config.lock_timeout);
    if board.refresh().await == RefreshOutcome::Failed {
        tracing::warn!(project = %project.key, "initial load failed");
    }

    let result = execute(command, &board, &project, out).await;

    for notice in events.drain_notices() {
        writeln!(err, "{notice}")?;
    }
    let display = result?;

    if display.mutated {
        store.save(&config.data_file).await?;
    }

    let state = board.snapshot();
    let view = view::project(state.tasks(), &display.query);
    if display.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&ui::render_json(&view))?)?;
    } else {
        writeln!(out, "{} · {}", project.key, project.name)?;
        for line in ui::render(&view, config.title_width) {
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

async fn execute(
    command: BoardCommand,
    board: &Controller,
    project: &Project,
    out: &mut dyn Write,
) -> Result<Rendering, CliError> {
    match command {
        BoardCommand::Board {
            query,
            priority,
            json,
        } => Ok(Rendering {
            query: BoardQuery {
                text: query,
                priority,
            },
            json,
            mutated: false,
        }),

        BoardCommand::Create {
            title,
            description,
            priority,
            task_type,
            points,
            hours,
            tags,
            assignee,
        } => {
            let mut new = NewTask::new(project.id.clone(), title);
            new.description = description;
            new.priority = priority;
            new.task_type = task_type;
            new.story_points = points;
            new.estimated_hours = hours;
            new.tags = tags.into_iter().map(|t| t.trim().to_string()).collect();
            new.assignee_id = assignee;
            let task = board.create_task(new).await?;
            writeln!(out, "Created {}", task.key)?;
            Ok(Rendering::after_mutation(true))
        }

        BoardCommand::Move { moves } => {
            let mut targets = Vec::with_capacity(moves.len());
            for MoveArg { key, status } in moves {
                targets.push((task_id(board, &key)?, key, status));
            }
            let outcomes = join_all(
                targets
                    .iter()
                    .map(|(id, _, status)| board.request_status_change(id, status.clone())),
            )
            .await;

            let mut committed = false;
            for ((_, key, status), outcome) in targets.iter().zip(outcomes) {
                let verdict = match outcome {
                    StatusChangeOutcome::Committed { .. } => {
                        committed = true;
                        "moved".to_string()
                    }
                    StatusChangeOutcome::RolledBack => "rolled back".to_string(),
                    StatusChangeOutcome::Rejected(rejection) => format!("skipped ({rejection})"),
                };
                writeln!(out, "{key} -> {}: {verdict}", status.label())?;
            }
            Ok(Rendering::after_mutation(committed))
        }

        BoardCommand::Edit {
            key,
            title,
            description,
            priority,
            points,
            clear_points,
            assignee,
        } => {
            let id = task_id(board, &key)?;
            let patch = TaskPatch {
                title,
                description: description.map(|d| Some(d).filter(|d| !d.trim().is_empty())),
                priority,
                story_points: if clear_points { Some(None) } else { points.map(Some) },
                assignee_id: assignee.map(|a| Some(a).filter(|a| !a.is_empty())),
                ..TaskPatch::default()
            };
            if patch.is_empty() {
                writeln!(out, "Nothing to change for {key}")?;
                return Ok(Rendering::after_mutation(false));
            }
            board.edit_task(&id, patch).await?;
            writeln!(out, "Updated {key}")?;
            Ok(Rendering::after_mutation(true))
        }

        BoardCommand::Delete { key } => {
            let id = task_id(board, &key)?;
            board.delete_task(&id).await?;
            writeln!(out, "Deleted {key}")?;
            Ok(Rendering::after_mutation(true))
        }
    }
}

fn task_id(board: &Controller, key: &str) -> Result<TaskId, CliError> {
    board
        .with_state(|s| s.task_by_key(key).map(|t| t.id.clone()))
        .ok_or_else(|| CliError::UnknownTask(key.to_string()))
}

async fn resolve_project(store: &TaskStore, key: Option<&str>) -> Result<Project, CliError> {
    if let Some(key) = key {
        return store
            .project_by_key(key)
            .await
            .ok_or_else(|| CliError::UnknownProject(key.to_string()));
    }
    let mut projects = store.projects().await;
    match projects.len() {
        0 => Err(CliError::NoProject),
        1 => Ok(projects.remove(0)),
        _ => Err(CliError::AmbiguousProject(
            projects
                .iter()
                .map(|p| p.key.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )),
    }
}
