// Matching: ranks a run's accepted jobs against a candidate profile.
// Retrieval narrows by embedding similarity, scoring applies the LLM rubric.

pub mod index;
pub mod prompts;
pub mod retrieval;
pub mod scoring;

use std::time::Duration;

/// Retrieval and scoring bounds.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Candidates kept after similarity search.
    pub top_k: usize,
    /// Scored jobs returned to the caller.
    pub top_n: usize,
    /// Concurrent embedding and scoring calls.
    pub concurrency: usize,
    /// Fraction of excluded candidates above which scoring fails.
    pub max_exclusion_rate: f32,
    pub call_timeout: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            top_k: 50,
            top_n: 10,
            concurrency: 5,
            max_exclusion_rate: 0.3,
            call_timeout: Duration::from_secs(60),
        }
    }
}
