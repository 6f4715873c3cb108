//! Filtered, column-grouped projection of a board snapshot.

use std::str::FromStr;

use kanban_proto::task::{ParseValueError, Task, TaskPriority, TaskStatus};

/// Priority criterion of a [`BoardQuery`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriorityFilter {
    /// Every priority.
    #[default]
    All,
    /// Exactly this priority.
    Only(TaskPriority),
}

impl FromStr for PriorityFilter {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::Only)
    }
}

/// Search text and priority filter applied before grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardQuery {
    /// Case-insensitive substring matched against title and key.
    pub text: String,
    /// Priority criterion.
    pub priority: PriorityFilter,
}

impl BoardQuery {
    /// Returns `true` if `task` passes both the text and the priority filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        let needle = self.text.trim().to_lowercase();
        let text_ok = needle.is_empty()
            || task.title.to_lowercase().contains(&needle)
            || task.key.to_lowercase().contains(&needle);
        let priority_ok = match self.priority {
            PriorityFilter::All => true,
            PriorityFilter::Only(p) => task.priority == p,
        };
        text_ok && priority_ok
    }
}

/// One board column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column<'a> {
    /// Status this column stands for.
    pub status: TaskStatus,
    /// Tasks in snapshot order.
    pub tasks: Vec<&'a Task>,
}

impl Column<'_> {
    /// Sum of story points, counting missing estimates as zero.
    #[must_use]
    pub fn story_points(&self) -> u32 {
        self.tasks
            .iter()
            .map(|t| u32::from(t.story_points.unwrap_or(0)))
            .sum()
    }
}

/// Result of [`project`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoardView<'a> {
    /// One column per known status, in board order.
    pub columns: Vec<Column<'a>>,
    /// Tasks that passed the query.
    pub visible: usize,
    /// Tasks in the unfiltered snapshot.
    pub total: usize,
    /// Tasks in the unfiltered snapshot whose status is `done`.
    pub done: usize,
}

impl BoardView<'_> {
    /// Share of done tasks, rounded to the nearest percent; 0 for an empty board.
    #[must_use]
    pub const fn progress_percent(&self) -> usize {
        if self.total == 0 {
            0
        } else {
            (self.done * 100 + self.total / 2) / self.total
        }
    }

    /// The column for `status`, if it is a known status.
    #[must_use]
    pub fn column(&self, status: &TaskStatus) -> Option<&Column<'_>> {
        self.columns.iter().find(|c| c.status == *status)
    }
}

/// Filters `tasks` by `query` and groups the survivors into status columns.
///
/// Tasks whose status is not a known column land in the first column so
/// that no task disappears from the board.
#[must_use]
pub fn project<'a>(tasks: &'a [Task], query: &BoardQuery) -> BoardView<'a> {
    let mut columns: Vec<Column<'a>> = TaskStatus::COLUMNS
        .iter()
        .map(|status| Column {
            status: status.clone(),
            tasks: Vec::new(),
        })
        .collect();

    let mut visible = 0;
    for task in tasks.iter().filter(|t| query.matches(t)) {
        let index = columns
            .iter()
            .position(|c| c.status == task.status)
            .unwrap_or(0);
        columns[index].tasks.push(task);
        visible += 1;
    }

    let done = tasks.iter().filter(|t| t.status == TaskStatus::Done).count();
    BoardView {
        columns,
        visible,
        total: tasks.len(),
        done,
    }
}
