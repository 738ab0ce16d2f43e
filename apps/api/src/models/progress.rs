use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::search::SearchResults;

/// Pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Browser,
    Analyzing,
    Validating,
    Extracting,
    QualityGate,
    Paginating,
    Indexing,
    Scoring,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

/// Error taxonomy surfaced to callers with terminal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CapabilityUnavailable,
    SchemaViolation,
    SelectorValidationFailure,
    LowYieldExtraction,
    ScoringExclusion,
    RunCancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalPayload {
    Results(SearchResults),
    Failure { kind: FailureKind, message: String },
    Cancelled { message: String },
}

/// One entry of a run's append-only progress sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: Uuid,
    /// Strictly increasing within a run, starting at 1.
    pub step: u64,
    pub stage: Stage,
    pub status: ProgressStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<TerminalPayload>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.payload.is_some()
    }

    /// SSE event name.
    pub fn event_name(&self) -> &'static str {
        match &self.payload {
            None => "progress",
            Some(TerminalPayload::Results(_)) => "result",
            Some(TerminalPayload::Failure { .. }) => "failure",
            Some(TerminalPayload::Cancelled { .. }) => "cancelled",
        }
    }
}
