//! Live and recently finished runs, keyed by run id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::progress::{ProgressStatus, Stage};
use crate::progress::ProgressPublisher;

#[derive(Clone)]
pub struct RunHandle {
    pub progress: Arc<ProgressPublisher>,
    pub cancel: CancellationToken,
    pub profile_id: Uuid,
    pub started_at: Instant,
    /// First time a sweep saw the run closed.
    closed_at: Option<Instant>,
}

pub struct RunRegistry {
    runs: RwLock<HashMap<Uuid, RunHandle>>,
    retention: Duration,
}

impl RunRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Allocates the publisher and cancellation token for a new run.
    pub async fn register(&self, run_id: Uuid, profile_id: Uuid) -> RunHandle {
        let handle = RunHandle {
            progress: Arc::new(ProgressPublisher::new(run_id)),
            cancel: CancellationToken::new(),
            profile_id,
            started_at: Instant::now(),
            closed_at: None,
        };
        handle
            .progress
            .publish(Stage::Browser, ProgressStatus::Pending, "Search queued");
        self.runs.write().await.insert(run_id, handle.clone());
        debug!(%run_id, "registered search run");
        handle
    }

    pub async fn get(&self, run_id: Uuid) -> Option<RunHandle> {
        self.runs.read().await.get(&run_id).cloned()
    }

    /// Requests cancellation. Returns false for unknown runs.
    pub async fn cancel(&self, run_id: Uuid) -> bool {
        match self.runs.read().await.get(&run_id) {
            Some(handle) => {
                if !handle.progress.is_closed() {
                    info!(%run_id, "cancellation requested");
                }
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn active(&self) -> usize {
        self.runs
            .read()
            .await
            .values()
            .filter(|handle| !handle.progress.is_closed())
            .count()
    }

    /// Drops runs that finished more than the retention period ago.
    /// Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, handle| {
            if !handle.progress.is_closed() {
                return true;
            }
            let closed_at = *handle.closed_at.get_or_insert(now);
            now.duration_since(closed_at) < self.retention
        });
        let removed = before - runs.len();
        if removed > 0 {
            debug!("pruned {removed} finished search runs");
        }
        removed
    }
}
