//! Integration tests for optimistic status reconciliation.
//!
//! Drives `BoardController` over a task store whose update and list calls
//! can be held open with oneshot gates, so concurrent round trips can be
//! interleaved deterministically.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::similar_names)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use kanban::board::{
    BoardController, BoardError, BoardEvents, NoticeLevel, RefreshOutcome, Rejection,
    StatusChangeOutcome, UPDATE_FAILED,
};
use kanban_proto::repository::{RepositoryError, TaskRepository};
use kanban_proto::task::{NewTask, Task, TaskFilter, TaskId, TaskPatch, TaskStatus};
use kanban_store::TaskStore;

// ---------------------------------------------------------------------------
// Gated repository
// ---------------------------------------------------------------------------

/// A `TaskStore` whose calls can be held until the test releases them.
///
/// A gated update resolves with the store's result when released with
/// `true` and fails without touching the store when released with `false`.
#[derive(Default)]
struct GatedRepo {
    store: TaskStore,
    update_gates: Mutex<HashMap<TaskId, oneshot::Receiver<bool>>>,
    list_gate: Mutex<Option<oneshot::Receiver<()>>>,
    update_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl GatedRepo {
    /// Holds the next update of `id` until the returned sender fires.
    fn gate_update(&self, id: &TaskId) -> oneshot::Sender<bool> {
        let (tx, rx) = oneshot::channel();
        self.update_gates.lock().insert(id.clone(), rx);
        tx
    }

    /// Holds the next list call until the returned sender fires.
    fn gate_next_list(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.list_gate.lock() = Some(rx);
        tx
    }

    fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl TaskRepository for GatedRepo {
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, RepositoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.list_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.store.list_tasks(filter).await
    }

    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, RepositoryError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.update_gates.lock().remove(id);
        if let Some(gate) = gate {
            if !gate.await.unwrap_or(false) {
                return Err(RepositoryError::Unavailable("rejected by test".to_string()));
            }
        }
        self.store.update_task(id, patch).await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<Task, RepositoryError> {
        self.store.delete_task(id).await
    }

    async fn create_task(&self, new: NewTask) -> Result<Task, RepositoryError> {
        self.store.create_task(new).await
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

type Board = BoardController<GatedRepo>;

/// Creates a loaded board with one task per status in `statuses`.
async fn setup(statuses: &[TaskStatus]) -> (Board, BoardEvents, Vec<TaskId>) {
    let repo = GatedRepo::default();
    let project = repo.store.add_project("ALPHA", "Project Alpha").await.unwrap();
    let mut ids = Vec::new();
    for (i, status) in statuses.iter().enumerate() {
        let mut new = NewTask::new(project.id.clone(), format!("Task number {}", i + 1));
        new.status = status.clone();
        ids.push(repo.store.create_task(new).await.unwrap().id);
    }
    let (board, events) = BoardController::new(repo, TaskFilter::project(project.id));
    assert_eq!(board.refresh().await, RefreshOutcome::Applied);
    (board, events, ids)
}

/// Yields until `cond` holds.
async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

fn visible(board: &Board, id: &TaskId) -> TaskStatus {
    board.with_state(|s| s.task(id).unwrap().status.clone())
}

fn confirmed(board: &Board, id: &TaskId) -> TaskStatus {
    board.with_state(|s| s.confirmed_status(id).unwrap().clone())
}

fn notices(events: &mut BoardEvents) -> Vec<(NoticeLevel, String)> {
    events
        .drain_notices()
        .into_iter()
        .map(|n| (n.level, n.message))
        .collect()
}

// ===========================================================================
// End-to-end scenario
// ===========================================================================

#[tokio::test]
async fn concurrent_success_and_failure_reconcile() {
    let (board, mut events, ids) = setup(&[TaskStatus::ToDo, TaskStatus::Review]).await;
    let ids = &ids;
    let (t1, t2) = (ids[0].clone(), ids[1].clone());
    let release_t1 = board.repository().gate_update(&t1);
    let release_t2 = board.repository().gate_update(&t2);
    let board_ref = &board;

    let (out1, out2, ()) = tokio::join!(
        board.request_status_change(&t1, TaskStatus::InProgress),
        board.request_status_change(&t2, TaskStatus::Done),
        async move {
            wait_until(|| board_ref.with_state(|s| s.pending_saves() == 2)).await;
            assert_eq!(visible(board_ref, &ids[0]), TaskStatus::InProgress);
            assert_eq!(visible(board_ref, &ids[1]), TaskStatus::Done);
            assert_eq!(board_ref.with_state(|s| s.in_flight_len()), 2);

            release_t2.send(false).unwrap();
            wait_until(|| board_ref.with_state(|s| s.pending_saves() == 1)).await;
            assert_eq!(visible(board_ref, &ids[1]), TaskStatus::Review);
            assert_eq!(visible(board_ref, &ids[0]), TaskStatus::InProgress);

            release_t1.send(true).unwrap();
        }
    );

    assert_eq!(
        out1,
        StatusChangeOutcome::Committed {
            refresh: RefreshOutcome::Applied
        }
    );
    assert_eq!(out2, StatusChangeOutcome::RolledBack);

    let (t1, t2) = (&ids[0], &ids[1]);
    assert_eq!(visible(&board, t1), TaskStatus::InProgress);
    assert_eq!(visible(&board, t2), TaskStatus::Review);
    assert_eq!(confirmed(&board, t1), TaskStatus::InProgress);
    assert_eq!(confirmed(&board, t2), TaskStatus::Review);

    let state = board.snapshot();
    assert_eq!(state.pending_saves(), 0);
    assert_eq!(state.in_flight_len(), 0);
    assert_eq!(
        notices(&mut events),
        vec![(NoticeLevel::Error, UPDATE_FAILED.to_string())]
    );
}

#[tokio::test]
async fn failure_after_many_unread_moves_still_reports_once() {
    let (board, mut events, ids) = setup(&vec![TaskStatus::ToDo; 41]).await;
    for id in &ids[..40] {
        let outcome = board.request_status_change(id, TaskStatus::Done).await;
        assert!(matches!(outcome, StatusChangeOutcome::Committed { .. }));
    }

    let last = &ids[40];
    board.repository().gate_update(last).send(false).unwrap();
    assert_eq!(
        board.request_status_change(last, TaskStatus::Done).await,
        StatusChangeOutcome::RolledBack
    );
    assert_eq!(visible(&board, last), TaskStatus::ToDo);
    assert_eq!(
        notices(&mut events),
        vec![(NoticeLevel::Error, UPDATE_FAILED.to_string())]
    );
}

// ===========================================================================
// Mutual exclusion
// ===========================================================================

#[tokio::test]
async fn second_request_for_in_flight_task_is_ignored() {
    let (board, mut events, ids) = setup(&[TaskStatus::ToDo]).await;
    let t = ids[0].clone();
    let release = board.repository().gate_update(&t);
    let board_ref = &board;

    let (first, ()) = tokio::join!(
        board.request_status_change(&t, TaskStatus::InProgress),
        async move {
            wait_until(|| board_ref.with_state(|s| s.is_in_flight(&ids[0]))).await;
            let second = board_ref
                .request_status_change(&ids[0], TaskStatus::Done)
                .await;
            assert_eq!(
                second,
                StatusChangeOutcome::Rejected(Rejection::AlreadyUpdating)
            );
            assert_eq!(board_ref.repository().update_calls(), 1);
            assert_eq!(board_ref.with_state(|s| s.pending_saves()), 1);
            assert_eq!(visible(board_ref, &ids[0]), TaskStatus::InProgress);
            release.send(true).unwrap();
        }
    );

    assert!(matches!(first, StatusChangeOutcome::Committed { .. }));
    assert_eq!(board.repository().update_calls(), 1);
    assert_eq!(visible(&board, &t), TaskStatus::InProgress);
    assert!(notices(&mut events).is_empty());
}

#[tokio::test]
async fn task_unlocks_after_failure() {
    let (board, _events, ids) = setup(&[TaskStatus::ToDo]).await;
    let release = board.repository().gate_update(&ids[0]);
    release.send(false).unwrap();
    assert_eq!(
        board
            .request_status_change(&ids[0], TaskStatus::Test)
            .await,
        StatusChangeOutcome::RolledBack
    );
    assert!(matches!(
        board
            .request_status_change(&ids[0], TaskStatus::Test)
            .await,
        StatusChangeOutcome::Committed { .. }
    ));
    assert_eq!(visible(&board, &ids[0]), TaskStatus::Test);
}

// ===========================================================================
// Rollback correctness
// ===========================================================================

#[tokio::test]
async fn rollback_returns_to_latest_confirmed_status() {
    let (board, _events, ids) = setup(&[TaskStatus::ToDo]).await;
    let t = &ids[0];

    assert!(matches!(
        board.request_status_change(t, TaskStatus::Review).await,
        StatusChangeOutcome::Committed { .. }
    ));
    assert_eq!(confirmed(&board, t), TaskStatus::Review);

    board.repository().gate_update(t).send(false).unwrap();
    assert_eq!(
        board.request_status_change(t, TaskStatus::Done).await,
        StatusChangeOutcome::RolledBack
    );
    assert_eq!(visible(&board, t), TaskStatus::Review);
    assert_eq!(confirmed(&board, t), TaskStatus::Review);
}

// ===========================================================================
// Refresh suppression
// ===========================================================================

#[tokio::test]
async fn success_with_other_save_outstanding_skips_refresh() {
    let (board, _events, ids) = setup(&[TaskStatus::ToDo, TaskStatus::ToDo]).await;
    let (x, y) = (ids[0].clone(), ids[1].clone());
    let release_x = board.repository().gate_update(&x);
    let release_y = board.repository().gate_update(&y);
    let lists_before = board.repository().list_calls();
    let board_ref = &board;
    let y_finished = AtomicBool::new(false);
    let y_finished = &y_finished;

    let (out_x, out_y, ()) = tokio::join!(
        board.request_status_change(&x, TaskStatus::Test),
        async {
            let outcome = board_ref.request_status_change(&y, TaskStatus::Done).await;
            y_finished.store(true, Ordering::SeqCst);
            outcome
        },
        async move {
            wait_until(|| board_ref.with_state(|s| s.pending_saves() == 2)).await;
            release_y.send(true).unwrap();
            wait_until(|| y_finished.load(Ordering::SeqCst)).await;
            // X is still outstanding: no fetch was issued and X stays optimistic.
            assert_eq!(board_ref.repository().list_calls(), lists_before);
            assert_eq!(visible(board_ref, &ids[0]), TaskStatus::Test);
            release_x.send(false).unwrap();
        }
    );

    assert_eq!(
        out_y,
        StatusChangeOutcome::Committed {
            refresh: RefreshOutcome::Skipped
        }
    );
    assert_eq!(out_x, StatusChangeOutcome::RolledBack);
    assert_eq!(board.repository().list_calls(), lists_before);
    assert_eq!(visible(&board, &x), TaskStatus::ToDo);
    assert_eq!(visible(&board, &y), TaskStatus::Done);
}

#[tokio::test]
async fn fetch_finishing_after_new_save_started_is_discarded() {
    let (board, _events, ids) = setup(&[TaskStatus::ToDo, TaskStatus::ToDo]).await;
    let (x, y) = (ids[0].clone(), ids[1].clone());
    let release_list = board.repository().gate_next_list();
    let release_x = board.repository().gate_update(&x);
    let lists_before = board.repository().list_calls();
    let board_ref = &board;
    let y_finished = AtomicBool::new(false);
    let y_finished = &y_finished;

    let (out_y, out_x, ()) = tokio::join!(
        async {
            let outcome = board_ref.request_status_change(&y, TaskStatus::Done).await;
            y_finished.store(true, Ordering::SeqCst);
            outcome
        },
        async {
            // Start X only once Y's refresh fetch is under way.
            wait_until(|| board_ref.repository().list_calls() == lists_before + 1).await;
            board_ref.request_status_change(&x, TaskStatus::Review).await
        },
        async move {
            wait_until(|| board_ref.with_state(|s| s.is_in_flight(&ids[0]))).await;
            release_list.send(()).unwrap();
            wait_until(|| y_finished.load(Ordering::SeqCst)).await;
            // The stale fetch did not overwrite X's optimistic status.
            assert_eq!(visible(board_ref, &ids[0]), TaskStatus::Review);
            assert_eq!(board_ref.with_state(|s| s.pending_saves()), 1);
            release_x.send(true).unwrap();
        }
    );

    assert_eq!(
        out_y,
        StatusChangeOutcome::Committed {
            refresh: RefreshOutcome::Discarded
        }
    );
    assert_eq!(
        out_x,
        StatusChangeOutcome::Committed {
            refresh: RefreshOutcome::Applied
        }
    );
    assert_eq!(visible(&board, &x), TaskStatus::Review);
    assert_eq!(visible(&board, &y), TaskStatus::Done);
}

#[tokio::test]
async fn explicit_refresh_during_save_is_discarded() {
    let (board, _events, ids) = setup(&[TaskStatus::ToDo]).await;
    let ids = &ids;
    let release = board.repository().gate_update(&ids[0]);
    let board_ref = &board;

    let (outcome, ()) = tokio::join!(
        board.request_status_change(&ids[0], TaskStatus::Done),
        async move {
            wait_until(|| board_ref.with_state(|s| s.is_saving())).await;
            assert_eq!(board_ref.refresh().await, RefreshOutcome::Discarded);
            assert_eq!(visible(board_ref, &ids[0]), TaskStatus::Done);
            release.send(true).unwrap();
        }
    );
    assert!(matches!(outcome, StatusChangeOutcome::Committed { .. }));
}

// ===========================================================================
// Other mutations during a status change
// ===========================================================================

#[tokio::test]
async fn edit_rejected_while_status_change_in_flight() {
    let (board, _events, ids) = setup(&[TaskStatus::ToDo]).await;
    let ids = &ids;
    let release = board.repository().gate_update(&ids[0]);
    let board_ref = &board;

    let (outcome, ()) = tokio::join!(
        board.request_status_change(&ids[0], TaskStatus::InProgress),
        async move {
            wait_until(|| board_ref.with_state(|s| s.is_in_flight(&ids[0]))).await;
            let patch = TaskPatch {
                title: Some("Renamed while moving".to_string()),
                ..TaskPatch::default()
            };
            let err = board_ref.edit_task(&ids[0], patch).await.unwrap_err();
            assert!(matches!(err, BoardError::AlreadyUpdating(_)));
            release.send(true).unwrap();
        }
    );
    assert!(matches!(outcome, StatusChangeOutcome::Committed { .. }));
}

#[tokio::test]
async fn delete_during_other_save_keeps_optimistic_state() {
    let (board, mut events, ids) = setup(&[TaskStatus::ToDo, TaskStatus::ToDo]).await;
    let (moving, doomed) = (ids[0].clone(), ids[1].clone());
    let release = board.repository().gate_update(&moving);
    let board_ref = &board;

    let (outcome, ()) = tokio::join!(
        board.request_status_change(&moving, TaskStatus::Done),
        async move {
            wait_until(|| board_ref.with_state(|s| s.is_in_flight(&ids[0]))).await;
            board_ref.delete_task(&doomed).await.unwrap();
            let state = board_ref.snapshot();
            assert!(state.task(&doomed).is_none());
            // The post-delete refresh was not committed over the pending move.
            assert_eq!(state.task(&ids[0]).unwrap().status, TaskStatus::Done);
            release.send(true).unwrap();
        }
    );
    assert!(matches!(outcome, StatusChangeOutcome::Committed { .. }));
    assert_eq!(board.with_state(|s| s.tasks().len()), 1);
    assert_eq!(
        notices(&mut events),
        vec![(NoticeLevel::Info, "Task deleted.".to_string())]
    );
}
