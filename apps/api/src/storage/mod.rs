//! Persistence for candidate profiles and finished-search history.
//!
//! `PgStore` is used when `DATABASE_URL` is set; otherwise everything lives
//! in a `MemoryStore` for the lifetime of the process.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::profile::CandidateProfile;
use crate::models::search::SearchRunRow;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn save_profile(&self, profile: &CandidateProfile) -> Result<(), StoreError>;

    async fn get_profile(&self, id: Uuid) -> Result<Option<CandidateProfile>, StoreError>;

    async fn record_run(&self, run: &SearchRunRow) -> Result<(), StoreError>;

    /// Most recent first.
    async fn list_runs(&self, profile_id: Uuid, limit: i64) -> Result<Vec<SearchRunRow>, StoreError>;
}
