//! Progress publisher: the per-run, append-only, strictly ordered event log.
//!
//! The log is the source of truth; a `watch` channel only wakes subscribers.
//! A subscriber replays everything already published and then follows live
//! events, so late or slow consumers never miss or reorder an event. The
//! stream ends right after the terminal event.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::stream::{self, Stream};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::progress::{ProgressEvent, ProgressStatus, Stage, TerminalPayload};

#[derive(Debug, Default)]
struct Log {
    events: Vec<ProgressEvent>,
    closed: bool,
}

#[derive(Debug)]
pub struct ProgressPublisher {
    run_id: Uuid,
    log: Mutex<Log>,
    notify: watch::Sender<u64>,
}

impl ProgressPublisher {
    pub fn new(run_id: Uuid) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            run_id,
            log: Mutex::new(Log::default()),
            notify,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a non-terminal event. Returns its step, or `None` once the run is closed.
    pub fn publish(
        &self,
        stage: Stage,
        status: ProgressStatus,
        message: impl Into<String>,
    ) -> Option<u64> {
        self.append(stage, status, message.into(), None)
    }

    /// Appends the terminal event and closes the log.
    pub fn finish(&self, payload: TerminalPayload, message: impl Into<String>) -> Option<u64> {
        let status = match &payload {
            TerminalPayload::Failure { .. } => ProgressStatus::Error,
            _ => ProgressStatus::Completed,
        };
        self.append(Stage::Complete, status, message.into(), Some(payload))
    }

    fn append(
        &self,
        stage: Stage,
        status: ProgressStatus,
        message: String,
        payload: Option<TerminalPayload>,
    ) -> Option<u64> {
        let mut log = self.lock();
        if log.closed {
            warn!(run_id = %self.run_id, "dropping progress event after terminal event: {message}");
            return None;
        }
        let step = log.events.len() as u64 + 1;
        let terminal = payload.is_some();
        debug!(run_id = %self.run_id, step, ?stage, ?status, "{message}");
        log.events.push(ProgressEvent {
            run_id: self.run_id,
            step,
            stage,
            status,
            message,
            timestamp: Utc::now(),
            payload,
        });
        log.closed = terminal;
        drop(log);
        self.notify.send_replace(step);
        Some(step)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.lock().events.clone()
    }

    /// Events with a step greater than `after`, and whether the log is closed.
    fn events_after(&self, after: u64) -> (Vec<ProgressEvent>, bool) {
        let log = self.lock();
        let start = (after as usize).min(log.events.len());
        (log.events[start..].to_vec(), log.closed)
    }

    /// Replays history then follows live events; ends after the terminal event.
    /// `after` skips already-seen steps (SSE `Last-Event-ID`).
    pub fn subscribe(self: &Arc<Self>, after: u64) -> impl Stream<Item = ProgressEvent> + Send {
        struct Cursor {
            publisher: Arc<ProgressPublisher>,
            receiver: watch::Receiver<u64>,
            seen: u64,
            pending: std::vec::IntoIter<ProgressEvent>,
            done: bool,
        }

        let cursor = Cursor {
            publisher: Arc::clone(self),
            receiver: self.notify.subscribe(),
            seen: after,
            pending: Vec::new().into_iter(),
            done: false,
        };

        stream::unfold(cursor, |mut cursor| async move {
            loop {
                if let Some(event) = cursor.pending.next() {
                    cursor.seen = event.step;
                    if event.is_terminal() {
                        cursor.done = true;
                    }
                    return Some((event, cursor));
                }
                if cursor.done {
                    return None;
                }
                let (fresh, closed) = cursor.publisher.events_after(cursor.seen);
                if !fresh.is_empty() {
                    cursor.pending = fresh.into_iter();
                    continue;
                }
                if closed {
                    return None;
                }
                // Sender lives as long as the publisher, which the cursor holds.
                if cursor.receiver.changed().await.is_err() {
                    return None;
                }
            }
        })
    }
}
