use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Structured résumé summary produced at ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub skills: Vec<String>,
    pub experience: String,
    pub education: String,
    #[serde(default)]
    pub years_experience: Option<f32>,
}

/// A candidate profile. Immutable for the lifetime of a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub id: Uuid,
    pub filename: String,
    pub resume_text: String,
    pub summary: ProfileSummary,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CandidateProfileRow {
    pub id: Uuid,
    pub filename: String,
    pub resume_text: String,
    pub skills: Vec<String>,
    pub experience_summary: String,
    pub education_summary: String,
    pub years_experience: Option<f32>,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl From<CandidateProfileRow> for CandidateProfile {
    fn from(row: CandidateProfileRow) -> Self {
        CandidateProfile {
            id: row.id,
            filename: row.filename,
            resume_text: row.resume_text,
            summary: ProfileSummary {
                skills: row.skills,
                experience: row.experience_summary,
                education: row.education_summary,
                years_experience: row.years_experience,
            },
            embedding: row.embedding,
            created_at: row.created_at,
        }
    }
}
