//! Property-based tests for the board state machine and projection.
//!
//! Uses proptest to verify:
//! 1. Requesting a task's current status changes nothing.
//! 2. A task never has more than one status change in flight, and the
//!    pending-save count always equals the number of locked tasks.
//! 3. Once every change has settled, each task shows its confirmed status,
//!    and a failed change restores the status confirmed before it.
//! 4. A refresh is never committed while a save is outstanding.
//! 5. Projection places every filtered task in exactly one column, with
//!    unknown statuses in the first column.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;

use proptest::prelude::*;

use kanban::board::view::{BoardQuery, PriorityFilter, project};
use kanban::board::{BoardState, Rejection, StatusChange};
use kanban_proto::project::ProjectId;
use kanban_proto::task::{NewTask, Task, TaskId, TaskPriority, TaskStatus};

// --- Strategies ---

/// Strategy for statuses, including ones the board does not know.
fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        4 => prop::sample::select(TaskStatus::COLUMNS.to_vec()),
        1 => "[a-z]{3,10}".prop_map(TaskStatus::from),
    ]
}

/// Strategy for priorities.
fn arb_priority() -> impl Strategy<Value = TaskPriority> {
    prop::sample::select(TaskPriority::ALL.to_vec())
}

/// Strategy for a board of 1..8 tasks with arbitrary statuses and priorities.
fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(
        (arb_status(), arb_priority(), "[A-Za-z ]{3,24}"),
        1..8,
    )
    .prop_map(|specs| {
        let project = ProjectId::new();
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (status, priority, title))| {
                let mut new = NewTask::new(project.clone(), format!("T{i} {title}"));
                new.status = status;
                new.priority = priority;
                new.into_task(format!("ALPHA-{}", i + 1), 1_000)
            })
            .collect()
    })
}

/// One step driven against a [`BoardState`].
#[derive(Debug, Clone)]
enum Op {
    /// Request a status change for task `index % len`.
    Begin(usize, TaskStatus),
    /// Settle outstanding change `index % outstanding`.
    Finish(usize, bool),
    /// Try to commit a fetch of the server's view.
    Refresh,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<usize>(), arb_status()).prop_map(|(i, s)| Op::Begin(i, s)),
        3 => (any::<usize>(), any::<bool>()).prop_map(|(i, ok)| Op::Finish(i, ok)),
        1 => Just(Op::Refresh),
    ]
}

// --- Helpers ---

fn loaded(tasks: &[Task]) -> BoardState {
    let mut state = BoardState::new();
    state.load(tasks.to_vec());
    state
}

fn statuses(state: &BoardState) -> Vec<TaskStatus> {
    state.tasks().iter().map(|t| t.status.clone()).collect()
}

fn ids(state: &BoardState) -> Vec<TaskId> {
    state.tasks().iter().map(|t| t.id.clone()).collect()
}

/// What a server that applied every successful change would return.
fn server_view(state: &BoardState, server: &HashMap<TaskId, TaskStatus>) -> Vec<Task> {
    state
        .tasks()
        .iter()
        .map(|t| {
            let mut t = t.clone();
            t.status = server[&t.id].clone();
            t
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Requesting the current status is a no-op.
    #[test]
    fn same_status_request_is_noop(tasks in arb_tasks(), pick in any::<usize>()) {
        let mut state = loaded(&tasks);
        let task = &tasks[pick % tasks.len()];
        let before = statuses(&state);

        let result = state.begin_status_change(&task.id, task.status.clone());

        prop_assert_eq!(result, Err(Rejection::Unchanged));
        prop_assert_eq!(statuses(&state), before);
        prop_assert_eq!(state.pending_saves(), 0);
        prop_assert!(!state.is_in_flight(&task.id));
    }

    /// Random interleavings keep the lock, counter and confirmed map consistent.
    #[test]
    fn interleaved_changes_reconcile(
        tasks in arb_tasks(),
        ops in prop::collection::vec(arb_op(), 0..40),
        final_outcomes in prop::collection::vec(any::<bool>(), 8),
    ) {
        let mut state = loaded(&tasks);
        let order = ids(&state);
        let mut server: HashMap<TaskId, TaskStatus> =
            tasks.iter().map(|t| (t.id.clone(), t.status.clone())).collect();
        let mut outstanding: Vec<StatusChange> = Vec::new();

        for op in ops {
            match op {
                Op::Begin(i, to) => {
                    let id = order[i % order.len()].clone();
                    let was_locked = state.is_in_flight(&id);
                    let current = state.task(&id).unwrap().status.clone();
                    match state.begin_status_change(&id, to.clone()) {
                        Ok(change) => {
                            prop_assert!(!was_locked);
                            prop_assert_ne!(&current, &to);
                            prop_assert_eq!(&change.confirmed, &server[&id]);
                            prop_assert_eq!(&state.task(&id).unwrap().status, &to);
                            outstanding.push(change);
                        }
                        Err(Rejection::AlreadyUpdating) => prop_assert!(was_locked),
                        Err(Rejection::Unchanged) => {
                            prop_assert!(!was_locked);
                            prop_assert_eq!(&current, &to);
                        }
                        Err(Rejection::NotFound) => prop_assert!(false, "task vanished"),
                    }
                }
                Op::Finish(i, ok) => {
                    if outstanding.is_empty() {
                        continue;
                    }
                    let change = outstanding.remove(i % outstanding.len());
                    let id = change.task_id.clone();
                    let to = change.to.clone();
                    let settled = state.finish_status_change(change, ok);
                    if ok {
                        server.insert(id.clone(), to);
                    }
                    // Success shows the new status; failure the last confirmed one.
                    prop_assert_eq!(&state.task(&id).unwrap().status, &server[&id]);
                    prop_assert_eq!(state.confirmed_status(&id), Some(&server[&id]));
                    prop_assert!(!state.is_in_flight(&id));
                    prop_assert_eq!(settled.refresh_allowed, ok && outstanding.is_empty());
                }
                Op::Refresh => {
                    let before = statuses(&state);
                    let fetched = server_view(&state, &server);
                    let committed = state.commit_refresh(fetched);
                    prop_assert_eq!(committed, outstanding.is_empty());
                    if !committed {
                        prop_assert_eq!(statuses(&state), before);
                    }
                }
            }

            prop_assert_eq!(state.pending_saves(), outstanding.len());
            prop_assert_eq!(state.in_flight_len(), outstanding.len());
            prop_assert_eq!(ids(&state), order.clone());
        }

        for (n, change) in outstanding.drain(..).enumerate() {
            let ok = final_outcomes[n % final_outcomes.len()];
            let id = change.task_id.clone();
            let to = change.to.clone();
            let _ = state.finish_status_change(change, ok);
            if ok {
                server.insert(id, to);
            }
        }

        prop_assert_eq!(state.pending_saves(), 0);
        prop_assert_eq!(state.in_flight_len(), 0);
        for task in state.tasks() {
            prop_assert_eq!(&task.status, &server[&task.id]);
            prop_assert_eq!(state.confirmed_status(&task.id), Some(&server[&task.id]));
        }
    }

    /// Every filtered task lands in exactly one column.
    #[test]
    fn projection_conserves_filtered_tasks(
        tasks in arb_tasks(),
        text in prop_oneof![Just(String::new()), "[a-z]{1,3}"],
        priority in prop_oneof![
            Just(PriorityFilter::All),
            arb_priority().prop_map(PriorityFilter::Only),
        ],
    ) {
        let query = BoardQuery { text, priority };
        let view = project(&tasks, &query);

        let expected: Vec<&Task> = tasks.iter().filter(|t| query.matches(t)).collect();
        let placed: usize = view.columns.iter().map(|c| c.tasks.len()).sum();
        prop_assert_eq!(placed, expected.len());
        prop_assert_eq!(view.visible, expected.len());
        prop_assert_eq!(view.total, tasks.len());
        prop_assert_eq!(view.columns.len(), TaskStatus::COLUMNS.len());

        for (i, column) in view.columns.iter().enumerate() {
            prop_assert_eq!(&column.status, &TaskStatus::COLUMNS[i]);
            for task in &column.tasks {
                if task.status.is_known() {
                    prop_assert_eq!(&task.status, &column.status);
                } else {
                    prop_assert_eq!(i, 0);
                }
            }
        }

        // Snapshot order is preserved inside each column.
        for column in &view.columns {
            let positions: Vec<usize> = column
                .tasks
                .iter()
                .map(|t| tasks.iter().position(|u| u.id == t.id).unwrap())
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
