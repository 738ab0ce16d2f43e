use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::job::ScoredJob;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Internship,
    #[default]
    Entry,
    Mid,
    Senior,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostedWithin {
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "month")]
    Month,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkMode {
    #[default]
    Remote,
    Onsite,
    Hybrid,
}

/// Immutable input to one search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub keywords: String,
    pub location: String,
    #[serde(default)]
    pub experience: ExperienceLevel,
    #[serde(default)]
    pub posted_within: PostedWithin,
    #[serde(default)]
    pub work_mode: WorkMode,
}

impl SearchCriteria {
    /// Returns the first validation problem, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.keywords.trim().is_empty() {
            return Err("keywords are required".to_string());
        }
        if self.location.trim().is_empty() {
            return Err("location is required".to_string());
        }
        Ok(())
    }
}

/// Final ranked output carried by the terminal progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub run_id: Uuid,
    pub profile_id: Uuid,
    pub total_jobs_found: usize,
    pub candidates_scored: usize,
    pub excluded: usize,
    pub top_jobs: Vec<ScoredJob>,
    pub search_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SearchRunRow {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub keywords: String,
    pub location: String,
    pub outcome: String,
    pub jobs_found: i32,
    pub top_job_ids: Vec<Uuid>,
    pub search_time_seconds: f64,
    pub created_at: DateTime<Utc>,
}
