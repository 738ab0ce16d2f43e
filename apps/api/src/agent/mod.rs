// Browsing agent: a bounded, self-correcting state machine that discovers
// page structure with the completion capability and extracts job postings.
// Flow: analyzer -> validator -> extractor -> quality gate -> pagination.

pub mod analyzer;
pub mod context;
pub mod error;
pub mod extractor;
pub mod orchestrator;
pub mod pagination;
pub mod prompts;
pub mod quality;
pub mod selectors;
pub mod validator;

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::browser::BrowserError;
use crate::llm_client::LlmError;

pub use error::{AgentError, Capability};

/// Retry, iteration and timing bounds for one browsing run.
#[derive(Debug, Clone)]
pub struct AgentLimits {
    pub max_pages: u32,
    /// Re-analysis attempts allowed per page before the run fails.
    pub max_reanalysis: u32,
    /// Extra extraction passes allowed per page after a low-yield pass.
    pub max_extraction_retries: u32,
    pub max_items_per_page: usize,
    /// Total accepted records after which browsing stops.
    pub max_jobs: usize,
    /// Skipped fraction above which a page counts as low yield.
    pub low_yield_threshold: f32,
    /// Applied to every browser and completion call.
    pub call_timeout: Duration,
    /// Pause after clicks so dynamic content can render.
    pub settle_delay: Duration,
    pub reuse_selectors_across_pages: bool,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_pages: 5,
            max_reanalysis: 3,
            max_extraction_retries: 1,
            max_items_per_page: 25,
            max_jobs: 50,
            low_yield_threshold: 0.5,
            call_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(1500),
            reuse_selectors_across_pages: false,
        }
    }
}

/// Wraps every suspension point of a run: each capability call gets a
/// timeout and races the run's cancellation token.
#[derive(Debug, Clone)]
pub struct CallGuard {
    cancel: CancellationToken,
    timeout: Duration,
}

impl CallGuard {
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn check(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub async fn browser<T, F>(&self, operation: &str, call: F) -> Result<T, AgentError>
    where
        F: Future<Output = Result<T, BrowserError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(inner) => inner.map_err(AgentError::from),
                Err(_) => Err(AgentError::Timeout {
                    capability: Capability::Browser,
                    operation: operation.to_string(),
                }),
            },
        }
    }

    pub async fn completion<T, F>(&self, operation: &str, call: F) -> Result<T, AgentError>
    where
        F: Future<Output = Result<T, LlmError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(inner) => inner.map_err(AgentError::from_completion),
                Err(_) => Err(AgentError::Timeout {
                    capability: Capability::Completion,
                    operation: operation.to_string(),
                }),
            },
        }
    }

    /// Cancellable sleep.
    pub async fn pause(&self, duration: Duration) -> Result<(), AgentError> {
        if duration.is_zero() {
            return self.check();
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_maps_elapsed_to_timeout() {
        let guard = CallGuard::new(CancellationToken::new(), Duration::from_millis(10));
        let result: Result<(), AgentError> = guard
            .browser("click", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(AgentError::Timeout {
                capability: Capability::Browser,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_guard_observes_cancellation() {
        let token = CancellationToken::new();
        let guard = CallGuard::new(token.clone(), Duration::from_secs(60));
        token.cancel();
        let result: Result<(), AgentError> = guard
            .completion("analyze", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
    }

    #[tokio::test]
    async fn test_guard_passes_through_success() {
        let guard = CallGuard::new(CancellationToken::new(), Duration::from_secs(1));
        let value = guard
            .browser("url", async { Ok::<_, BrowserError>(5) })
            .await
            .unwrap();
        assert_eq!(value, 5);
    }
}
