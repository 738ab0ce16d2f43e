//! Vector index capability and its in-process implementation.
//!
//! Entries are partitioned by namespace (one per run), so a query never sees
//! another run's records.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    pub id: Uuid,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, namespace: &str, id: Uuid, vector: Vec<f32>) -> Result<(), IndexError>;

    /// Top `k` entries of `namespace` by cosine similarity, best first.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexError>;

    async fn drop_namespace(&self, namespace: &str) -> Result<(), IndexError>;
}

#[derive(Default)]
pub struct InMemoryVectorIndex {
    namespaces: RwLock<HashMap<String, HashMap<Uuid, Vec<f32>>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, namespace: &str, id: Uuid, vector: Vec<f32>) -> Result<(), IndexError> {
        let mut namespaces = self.namespaces.write().await;
        let entries = namespaces.entry(namespace.to_string()).or_default();
        if let Some(existing) = entries.values().next() {
            if existing.len() != vector.len() {
                return Err(IndexError::DimensionMismatch {
                    expected: existing.len(),
                    actual: vector.len(),
                });
            }
        }
        entries.insert(id, vector);
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let namespaces = self.namespaces.read().await;
        let Some(entries) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut hits = Vec::with_capacity(entries.len());
        for (id, stored) in entries {
            if stored.len() != vector.len() {
                return Err(IndexError::DimensionMismatch {
                    expected: stored.len(),
                    actual: vector.len(),
                });
            }
            hits.push(IndexHit {
                id: *id,
                score: cosine_similarity(vector, stored),
            });
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    async fn drop_namespace(&self, namespace: &str) -> Result<(), IndexError> {
        self.namespaces.write().await.remove(namespace);
        Ok(())
    }
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_query_ranks_and_truncates() {
        let index = InMemoryVectorIndex::new();
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        let middle = Uuid::new_v4();
        index.upsert("run", near, vec![1.0, 0.1]).await.unwrap();
        index.upsert("run", far, vec![0.0, 1.0]).await.unwrap();
        index.upsert("run", middle, vec![1.0, 1.0]).await.unwrap();

        let hits = index.query("run", &[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<Uuid> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![near, middle]);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let index = InMemoryVectorIndex::new();
        index.upsert("run-a", Uuid::new_v4(), vec![1.0]).await.unwrap();
        assert!(index.query("run-b", &[1.0], 10).await.unwrap().is_empty());

        index.drop_namespace("run-a").await.unwrap();
        assert!(index.query("run-a", &[1.0], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let index = InMemoryVectorIndex::new();
        index.upsert("run", Uuid::new_v4(), vec![1.0, 0.0]).await.unwrap();
        let result = index.upsert("run", Uuid::new_v4(), vec![1.0]).await;
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }
}
