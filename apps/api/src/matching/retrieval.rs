//! Retrieval engine: embeds a run's accepted records into the vector index
//! under the run's namespace and pulls the top-K by similarity to the
//! candidate's résumé embedding.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::llm_client::embeddings::{Embedder, EmbeddingError};
use crate::matching::index::{IndexError, VectorIndex};
use crate::matching::MatchingConfig;
use crate::models::job::JobRecord;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector index failed: {0}")]
    Index(#[from] IndexError),

    #[error("embedding timed out")]
    Timeout,

    #[error("retrieval cancelled")]
    Cancelled,
}

/// A record shortlisted for scoring.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub job: JobRecord,
    pub similarity: f32,
}

pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    concurrency: usize,
    call_timeout: Duration,
}

impl RetrievalEngine {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, config: &MatchingConfig) -> Self {
        Self {
            embedder,
            index,
            top_k: config.top_k,
            concurrency: config.concurrency.max(1),
            call_timeout: config.call_timeout,
        }
    }

    /// Embeds and upserts every record. Returns how many were indexed.
    pub async fn index_records(
        &self,
        namespace: &str,
        records: &[JobRecord],
        cancel: &CancellationToken,
    ) -> Result<usize, RetrievalError> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let tasks = records.iter().map(|record| {
            let permits = Arc::clone(&permits);
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| RetrievalError::Cancelled)?;
                if cancel.is_cancelled() {
                    return Err(RetrievalError::Cancelled);
                }
                let vector = tokio::time::timeout(
                    self.call_timeout,
                    self.embedder.embed(&record.search_text()),
                )
                .await
                .map_err(|_| RetrievalError::Timeout)??;
                self.index.upsert(namespace, record.id, vector).await?;
                Ok::<_, RetrievalError>(())
            }
        });

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetrievalError::Cancelled),
            results = join_all(tasks) => results,
        };
        for result in results {
            result?;
        }
        info!("indexed {} records into {namespace}", records.len());
        Ok(records.len())
    }

    /// Top-K records by cosine similarity; equal scores favour the more
    /// recent posting. An empty namespace yields an empty list.
    pub async fn retrieve(
        &self,
        namespace: &str,
        profile_embedding: &[f32],
        records: &[JobRecord],
    ) -> Result<Vec<Candidate>, RetrievalError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        // Every record of the run is fetched so the recency tie-break also
        // applies at the K boundary.
        let hits = self
            .index
            .query(namespace, profile_embedding, records.len().max(self.top_k))
            .await?;

        let by_id: HashMap<_, _> = records.iter().map(|r| (r.id, r)).collect();
        let mut candidates: Vec<Candidate> = hits
            .into_iter()
            .filter_map(|hit| {
                by_id.get(&hit.id).map(|job| Candidate {
                    job: (*job).clone(),
                    similarity: hit.score,
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.job.posted_at.cmp(&a.job.posted_at))
        });
        candidates.truncate(self.top_k);
        debug!(
            "retrieved {} of {} records for scoring",
            candidates.len(),
            records.len()
        );
        Ok(candidates)
    }

    pub async fn release(&self, namespace: &str) -> Result<(), RetrievalError> {
        self.index.drop_namespace(namespace).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::embeddings::HashingEmbedder;
    use crate::matching::index::InMemoryVectorIndex;
    use chrono::{Duration as ChronoDuration, Utc};

    fn record(title: &str, description: &str, age_days: i64) -> JobRecord {
        let url = format!("https://jobs.example.com/{}", title.replace(' ', "-"));
        JobRecord {
            id: JobRecord::id_for_url(&url),
            title: title.to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            compensation: None,
            posted_text: format!("{age_days} days ago"),
            posted_at: Some(Utc::now() - ChronoDuration::days(age_days)),
            description: description.to_string(),
            source_url: url,
        }
    }

    fn engine(top_k: usize) -> RetrievalEngine {
        RetrievalEngine::new(
            Arc::new(HashingEmbedder),
            Arc::new(InMemoryVectorIndex::new()),
            &MatchingConfig {
                top_k,
                ..MatchingConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_k_larger_than_index_returns_everything_ranked() {
        let engine = engine(50);
        let records = vec![
            record("Python Developer", "Python and SQL data pipelines", 1),
            record("Pastry Chef", "Croissants and laminated dough", 2),
            record("Data Engineer", "SQL warehouse modelling with Python", 3),
        ];
        let cancel = CancellationToken::new();
        engine.index_records("run", &records, &cancel).await.unwrap();

        let profile = HashingEmbedder::vectorize("Python SQL");
        let candidates = engine.retrieve("run", &profile, &records).await.unwrap();

        assert_eq!(candidates.len(), 3);
        assert!(candidates
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
        assert_eq!(candidates[2].job.title, "Pastry Chef");
    }

    #[tokio::test]
    async fn test_ties_prefer_recent_postings() {
        let engine = engine(50);
        let mut older = record("Rust Engineer A", "Rust services", 10);
        let mut newer = record("Rust Engineer B", "Rust services", 1);
        // Same text embeds identically.
        older.title = "Rust Engineer".to_string();
        newer.title = "Rust Engineer".to_string();
        let records = vec![older, newer];
        engine
            .index_records("run", &records, &CancellationToken::new())
            .await
            .unwrap();

        let profile = HashingEmbedder::vectorize("Rust");
        let candidates = engine.retrieve("run", &profile, &records).await.unwrap();
        assert_eq!(candidates[0].job.posted_text, "1 days ago");
    }

    #[tokio::test]
    async fn test_recency_decides_ties_at_the_k_boundary() {
        // Both id orderings, so the newer posting never wins by id alone.
        let orderings = [
            ("Rust Engineer A", "Rust Engineer B"),
            ("Rust Engineer B", "Rust Engineer A"),
        ];
        for (older_url, newer_url) in orderings {
            let engine = engine(1);
            let mut older = record(older_url, "Rust services", 10);
            let mut newer = record(newer_url, "Rust services", 1);
            older.title = "Rust Engineer".to_string();
            newer.title = "Rust Engineer".to_string();
            let records = vec![older, newer];
            engine
                .index_records("run", &records, &CancellationToken::new())
                .await
                .unwrap();

            let profile = HashingEmbedder::vectorize("Rust");
            let candidates = engine.retrieve("run", &profile, &records).await.unwrap();
            assert_eq!(candidates.len(), 1);
            assert_eq!(candidates[0].job.posted_text, "1 days ago");
        }
    }

    #[tokio::test]
    async fn test_empty_input_is_not_an_error() {
        let engine = engine(50);
        let candidates = engine
            .retrieve("run", &HashingEmbedder::vectorize("Rust"), &[])
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_indexing() {
        let engine = engine(50);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine
            .index_records("run", &[record("Rust Engineer", "Rust", 1)], &cancel)
            .await;
        assert!(matches!(result, Err(RetrievalError::Cancelled)));
    }
}
