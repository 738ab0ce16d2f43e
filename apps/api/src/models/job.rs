use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A job posting accepted by the quality gate. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// UUIDv5 of the normalized source URL, so identity follows the URL.
    pub id: Uuid,
    pub title: String,
    pub company: String,
    pub location: String,
    pub compensation: Option<String>,
    /// Recency exactly as the page displayed it ("3 days ago").
    pub posted_text: String,
    /// Best-effort absolute timestamp derived from `posted_text`.
    pub posted_at: Option<DateTime<Utc>>,
    pub description: String,
    pub source_url: String,
}

impl JobRecord {
    pub fn id_for_url(source_url: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, source_url.as_bytes())
    }

    /// Text submitted to the embedder for this record.
    pub fn search_text(&self) -> String {
        format!("{} at {}. {}", self.title, self.company, self.description)
    }
}

/// Per-dimension rubric scores on the 0–10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub skills: f32,
    pub experience: f32,
    pub education: f32,
    pub overall: f32,
}

/// A JobRecord ranked against a candidate profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredJob {
    pub job: JobRecord,
    pub scores: SubScores,
    /// Weighted composite on the 0–100 scale.
    pub composite: f32,
    /// Cosine similarity from retrieval, kept for transparency.
    pub similarity: f32,
    pub rationale: String,
}
