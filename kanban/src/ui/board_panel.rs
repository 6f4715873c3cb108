//! Board rendering.

use serde_json::{Value, json};

use kanban_proto::task::Task;

use super::truncate;
use crate::board::view::BoardView;

const PROGRESS_BAR_WIDTH: usize = 20;

/// Renders the board header and every column as lines of text.
#[must_use]
pub fn render(view: &BoardView<'_>, title_width: usize) -> Vec<String> {
    let mut lines = vec![header(view)];
    for column in &view.columns {
        lines.push(String::new());
        lines.push(format!(
            "== {} ({}) · {} pts ==",
            column.status.label(),
            column.tasks.len(),
            column.story_points()
        ));
        if column.tasks.is_empty() {
            lines.push("  (no tasks)".to_string());
        }
        lines.extend(column.tasks.iter().map(|t| task_line(t, title_width)));
    }
    lines
}

fn header(view: &BoardView<'_>) -> String {
    let percent = view.progress_percent();
    let filled = percent * PROGRESS_BAR_WIDTH / 100;
    format!(
        "{}/{} done [{}{}] {percent}% · {} shown",
        view.done,
        view.total,
        "#".repeat(filled),
        "-".repeat(PROGRESS_BAR_WIDTH - filled),
        view.visible
    )
}

fn task_line(task: &Task, title_width: usize) -> String {
    let mut line = format!(
        "  {:<10} {}  [{}]",
        task.key,
        truncate(&task.title, title_width),
        task.priority
    );
    if let Some(points) = task.story_points {
        line.push_str(&format!(" ({points})"));
    }
    if !task.status.is_known() {
        line.push_str(&format!(" <{}>", task.status));
    }
    line
}

fn task_json(task: &Task) -> Value {
    json!({
        "id": task.id.to_string(),
        "key": task.key,
        "title": task.title,
        "status": task.status.as_str(),
        "priority": task.priority.as_str(),
        "type": task.task_type.as_str(),
        "story_points": task.story_points,
        "tags": task.tags,
    })
}

/// Renders the board as a JSON document for scripting.
#[must_use]
pub fn render_json(view: &BoardView<'_>) -> Value {
    let columns: Vec<Value> = view
        .columns
        .iter()
        .map(|column| {
            let tasks: Vec<Value> = column.tasks.iter().map(|t| task_json(t)).collect();
            json!({
                "status": column.status.as_str(),
                "label": column.status.label(),
                "story_points": column.story_points(),
                "tasks": tasks,
            })
        })
        .collect();
    json!({
        "total": view.total,
        "done": view.done,
        "visible": view.visible,
        "progress_percent": view.progress_percent(),
        "columns": columns,
    })
}
