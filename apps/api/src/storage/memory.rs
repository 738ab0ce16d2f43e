use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::profile::CandidateProfile;
use crate::models::search::SearchRunRow;
use crate::storage::{Store, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    profiles: RwLock<HashMap<Uuid, CandidateProfile>>,
    runs: RwLock<Vec<SearchRunRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_profile(&self, profile: &CandidateProfile) -> Result<(), StoreError> {
        self.profiles
            .write()
            .await
            .insert(profile.id, profile.clone());
        Ok(())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<CandidateProfile>, StoreError> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn record_run(&self, run: &SearchRunRow) -> Result<(), StoreError> {
        self.runs.write().await.push(run.clone());
        Ok(())
    }

    async fn list_runs(&self, profile_id: Uuid, limit: i64) -> Result<Vec<SearchRunRow>, StoreError> {
        let runs = self.runs.read().await;
        let mut matching: Vec<SearchRunRow> = runs
            .iter()
            .filter(|run| run.profile_id == profile_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}
