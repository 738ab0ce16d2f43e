use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::profile::{CandidateProfile, CandidateProfileRow};
use crate::models::search::SearchRunRow;
use crate::storage::{Store, StoreError};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS candidate_profiles (
        id UUID PRIMARY KEY,
        filename TEXT NOT NULL,
        resume_text TEXT NOT NULL,
        skills TEXT[] NOT NULL DEFAULT '{}',
        experience_summary TEXT NOT NULL DEFAULT '',
        education_summary TEXT NOT NULL DEFAULT '',
        years_experience REAL,
        embedding REAL[] NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS search_runs (
        id UUID PRIMARY KEY,
        profile_id UUID NOT NULL REFERENCES candidate_profiles(id) ON DELETE CASCADE,
        keywords TEXT NOT NULL,
        location TEXT NOT NULL,
        outcome TEXT NOT NULL,
        jobs_found INTEGER NOT NULL,
        top_job_ids UUID[] NOT NULL DEFAULT '{}',
        search_time_seconds DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS search_runs_profile_idx ON search_runs (profile_id, created_at DESC)",
];

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tables on first start. Idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema ready");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn save_profile(&self, profile: &CandidateProfile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO candidate_profiles
                (id, filename, resume_text, skills, experience_summary,
                 education_summary, years_experience, embedding, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(profile.id)
        .bind(&profile.filename)
        .bind(&profile.resume_text)
        .bind(&profile.summary.skills)
        .bind(&profile.summary.experience)
        .bind(&profile.summary.education)
        .bind(profile.summary.years_experience)
        .bind(&profile.embedding)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<CandidateProfile>, StoreError> {
        let row = sqlx::query_as::<_, CandidateProfileRow>(
            r#"
            SELECT id, filename, resume_text, skills, experience_summary,
                   education_summary, years_experience, embedding, created_at
            FROM candidate_profiles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CandidateProfile::from))
    }

    async fn record_run(&self, run: &SearchRunRow) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO search_runs
                (id, profile_id, keywords, location, outcome, jobs_found,
                 top_job_ids, search_time_seconds, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(run.id)
        .bind(run.profile_id)
        .bind(&run.keywords)
        .bind(&run.location)
        .bind(&run.outcome)
        .bind(run.jobs_found)
        .bind(&run.top_job_ids)
        .bind(run.search_time_seconds)
        .bind(run.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_runs(&self, profile_id: Uuid, limit: i64) -> Result<Vec<SearchRunRow>, StoreError> {
        let rows = sqlx::query_as::<_, SearchRunRow>(
            r#"
            SELECT id, profile_id, keywords, location, outcome, jobs_found,
                   top_job_ids, search_time_seconds, created_at
            FROM search_runs
            WHERE profile_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(profile_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
