//! Event stream from a [`super::BoardController`] to its consumer.
//!
//! Notices are queued without bound so a failure is never lost, however
//! far behind the consumer is. `Changed` is a redraw hint and is coalesced:
//! at most one sits in the queue until the consumer takes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::{BoardEvent, Notice};

/// Creates a connected sender/receiver pair.
pub(crate) fn channel() -> (EventSender, BoardEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    let change_queued = Arc::new(AtomicBool::new(false));
    (
        EventSender {
            tx,
            change_queued: Arc::clone(&change_queued),
        },
        BoardEvents { rx, change_queued },
    )
}

/// Sending half, owned by the controller.
#[derive(Debug)]
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<BoardEvent>,
    change_queued: Arc<AtomicBool>,
}

impl EventSender {
    /// Signals a snapshot change unless one is already waiting.
    pub(crate) fn changed(&self) {
        if self.change_queued.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.tx.send(BoardEvent::Changed).is_err() {
            tracing::trace!("board event receiver gone");
        }
    }

    /// Queues a notice for the user.
    pub(crate) fn notice(&self, notice: Notice) {
        if let Err(e) = self.tx.send(BoardEvent::Notice(notice)) {
            tracing::debug!(notice = ?e.0, "board event receiver gone, notice not delivered");
        }
    }
}

/// Receiving half of a controller's events.
#[derive(Debug)]
pub struct BoardEvents {
    rx: mpsc::UnboundedReceiver<BoardEvent>,
    change_queued: Arc<AtomicBool>,
}

impl BoardEvents {
    /// Waits for the next event. Returns `None` once the controller is gone
    /// and the queue is empty.
    pub async fn recv(&mut self) -> Option<BoardEvent> {
        let event = self.rx.recv().await;
        self.taken(event.as_ref());
        event
    }

    /// Takes the next event without waiting.
    ///
    /// # Errors
    ///
    /// Returns `TryRecvError::Empty` when nothing is queued, or
    /// `TryRecvError::Disconnected` once the controller is gone.
    pub fn try_recv(&mut self) -> Result<BoardEvent, TryRecvError> {
        let event = self.rx.try_recv()?;
        self.taken(Some(&event));
        Ok(event)
    }

    /// Drains everything queued and returns only the notices.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(event) = self.try_recv() {
            if let BoardEvent::Notice(notice) = event {
                notices.push(notice);
            }
        }
        notices
    }

    // Cleared before the event is handed out, so a change made while the
    // consumer renders queues a fresh `Changed`.
    fn taken(&self, event: Option<&BoardEvent>) {
        if matches!(event, Some(BoardEvent::Changed)) {
            self.change_queued.store(false, Ordering::Release);
        }
    }
}
