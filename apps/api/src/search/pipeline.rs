//! One search run end to end: browse, index, retrieve, score, report.
//!
//! `execute` never returns an error. Every run ends with exactly one terminal
//! progress event and one history row, whatever happened along the way.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::orchestrator::{Orchestrator, RunOutcome};
use crate::agent::{AgentError, AgentLimits, CallGuard};
use crate::browser::{BrowserLauncher, BrowserSession};
use crate::llm_client::embeddings::Embedder;
use crate::llm_client::CompletionCapability;
use crate::matching::index::VectorIndex;
use crate::matching::retrieval::{Candidate, RetrievalEngine, RetrievalError};
use crate::matching::scoring::{ScoringEngine, ScoringError};
use crate::matching::MatchingConfig;
use crate::models::profile::CandidateProfile;
use crate::models::progress::{FailureKind, ProgressStatus, Stage, TerminalPayload};
use crate::models::search::{SearchCriteria, SearchResults, SearchRunRow};
use crate::progress::ProgressPublisher;
use crate::search::url::build_search_url;
use crate::storage::Store;

const NAVIGATION_ATTEMPTS: u32 = 3;
const NAVIGATION_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("invalid search request: {0}")]
    Invalid(String),
}

impl SearchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SearchError::Agent(e) => e.kind(),
            SearchError::Retrieval(RetrievalError::Cancelled) => FailureKind::RunCancelled,
            SearchError::Retrieval(_) => FailureKind::CapabilityUnavailable,
            SearchError::Scoring(ScoringError::Cancelled) => FailureKind::RunCancelled,
            SearchError::Scoring(ScoringError::TooManyExclusions { .. }) => {
                FailureKind::ScoringExclusion
            }
            SearchError::Invalid(_) => FailureKind::SchemaViolation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == FailureKind::RunCancelled
    }
}

pub struct SearchPipeline {
    pub launcher: Arc<dyn BrowserLauncher>,
    pub completion: Arc<dyn CompletionCapability>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub store: Arc<dyn Store>,
    pub limits: AgentLimits,
    pub matching: MatchingConfig,
    pub search_url: String,
}

impl SearchPipeline {
    /// Runs the search, publishes the terminal event and records history.
    pub async fn execute(
        &self,
        run_id: Uuid,
        profile: CandidateProfile,
        criteria: SearchCriteria,
        progress: Arc<ProgressPublisher>,
        cancel: CancellationToken,
    ) {
        let started = Instant::now();
        info!(%run_id, profile_id = %profile.id, keywords = %criteria.keywords, "search started");

        let result = self
            .run(run_id, &profile, &criteria, &progress, &cancel, started)
            .await;

        let (outcome, jobs_found, top_job_ids) = match result {
            Ok(results) => {
                let message = format!(
                    "Found {} jobs, ranked the top {}",
                    results.total_jobs_found,
                    results.top_jobs.len()
                );
                let summary = (
                    "completed",
                    results.total_jobs_found,
                    results.top_jobs.iter().map(|s| s.job.id).collect(),
                );
                progress.finish(TerminalPayload::Results(results), message);
                summary
            }
            Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
                info!(%run_id, "search cancelled");
                progress.finish(
                    TerminalPayload::Cancelled {
                        message: "Search cancelled by request".to_string(),
                    },
                    "Search cancelled",
                );
                ("cancelled", 0, Vec::new())
            }
            Err(e) => {
                error!(%run_id, "search failed: {e}");
                progress.finish(
                    TerminalPayload::Failure {
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                    format!("Search failed: {e}"),
                );
                ("failed", 0, Vec::new())
            }
        };

        let row = SearchRunRow {
            id: run_id,
            profile_id: profile.id,
            keywords: criteria.keywords.trim().to_string(),
            location: criteria.location.trim().to_string(),
            outcome: outcome.to_string(),
            jobs_found: i32::try_from(jobs_found).unwrap_or(i32::MAX),
            top_job_ids,
            search_time_seconds: started.elapsed().as_secs_f64(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.record_run(&row).await {
            warn!(%run_id, "failed to record search history: {e}");
        }
    }

    async fn run(
        &self,
        run_id: Uuid,
        profile: &CandidateProfile,
        criteria: &SearchCriteria,
        progress: &Arc<ProgressPublisher>,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<SearchResults, SearchError> {
        let url = build_search_url(&self.search_url, criteria).map_err(SearchError::Invalid)?;
        let guard = CallGuard::new(cancel.clone(), self.limits.call_timeout);

        progress.publish(Stage::Browser, ProgressStatus::Processing, "Launching browser");
        let session = guard.browser("launch", self.launcher.launch()).await?;

        let browsed = self.browse(&session, &url, progress, &guard).await;
        match tokio::time::timeout(self.limits.call_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%run_id, "failed to close browser session: {e}"),
            Err(_) => warn!(%run_id, "timed out closing browser session"),
        }
        let browsed = browsed?;
        info!(
            %run_id,
            "browsing finished after {} pages with {} jobs",
            browsed.pages_visited,
            browsed.records.len()
        );

        let candidates = self
            .shortlist(run_id, profile, &browsed, progress, cancel)
            .await?;

        progress.publish(
            Stage::Scoring,
            ProgressStatus::Processing,
            format!("Scoring {} candidate jobs", candidates.len()),
        );
        let report = ScoringEngine::new(Arc::clone(&self.completion), &self.matching)
            .score(profile, candidates, progress, cancel)
            .await?;
        progress.publish(
            Stage::Scoring,
            ProgressStatus::Completed,
            format!("Scored {} jobs, excluded {}", report.scored, report.excluded),
        );

        Ok(SearchResults {
            run_id,
            profile_id: profile.id,
            total_jobs_found: browsed.records.len(),
            candidates_scored: report.scored,
            excluded: report.excluded,
            top_jobs: report.ranked,
            search_time_seconds: started.elapsed().as_secs_f64(),
        })
    }

    async fn browse(
        &self,
        session: &Arc<dyn BrowserSession>,
        url: &str,
        progress: &Arc<ProgressPublisher>,
        guard: &CallGuard,
    ) -> Result<RunOutcome, AgentError> {
        let mut attempt = 1;
        loop {
            match guard.browser("navigate", session.navigate(url)).await {
                Ok(()) => break,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if attempt < NAVIGATION_ATTEMPTS => {
                    warn!("navigation attempt {attempt} failed: {e}");
                    progress.publish(
                        Stage::Browser,
                        ProgressStatus::Error,
                        format!("Navigation failed (attempt {attempt}/{NAVIGATION_ATTEMPTS}): {e}"),
                    );
                    guard.pause(NAVIGATION_BACKOFF).await?;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(AgentError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    })
                }
            }
        }
        progress.publish(Stage::Browser, ProgressStatus::Completed, "Opened job search results");
        guard.pause(self.limits.settle_delay).await?;

        Orchestrator::new(
            Arc::clone(session),
            Arc::clone(&self.completion),
            self.limits.clone(),
            Arc::clone(progress),
        )
        .run(guard)
        .await
    }

    /// Indexes the run's records under their own namespace and returns the
    /// top-K by similarity. The namespace is released either way.
    async fn shortlist(
        &self,
        run_id: Uuid,
        profile: &CandidateProfile,
        browsed: &RunOutcome,
        progress: &ProgressPublisher,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candidate>, SearchError> {
        let namespace = format!("run-{run_id}");
        let retrieval = RetrievalEngine::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            &self.matching,
        );
        progress.publish(
            Stage::Indexing,
            ProgressStatus::Processing,
            format!("Indexing {} jobs", browsed.records.len()),
        );

        let shortlisted = async {
            retrieval
                .index_records(&namespace, &browsed.records, cancel)
                .await?;
            retrieval
                .retrieve(&namespace, &profile.embedding, &browsed.records)
                .await
        }
        .await;
        if let Err(e) = retrieval.release(&namespace).await {
            warn!(%run_id, "failed to release index namespace: {e}");
        }

        let candidates = shortlisted?;
        progress.publish(
            Stage::Indexing,
            ProgressStatus::Completed,
            format!(
                "Shortlisted {} of {} jobs",
                candidates.len(),
                browsed.records.len()
            ),
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::embeddings::HashingEmbedder;
    use crate::matching::index::InMemoryVectorIndex;
    use crate::models::profile::ProfileSummary;
    use crate::models::progress::ProgressEvent;
    use crate::models::search::{ExperienceLevel, PostedWithin, WorkMode};
    use crate::storage::MemoryStore;
    use crate::testing::{FakeBrowser, FakeLauncher, Reply, ScriptedCompletion};

    struct Harness {
        browser: Arc<FakeBrowser>,
        completion: Arc<ScriptedCompletion>,
        store: Arc<MemoryStore>,
        index: Arc<InMemoryVectorIndex>,
        launcher_unavailable: bool,
    }

    impl Harness {
        fn new(browser: FakeBrowser, completion: ScriptedCompletion) -> Self {
            Self {
                browser: Arc::new(browser),
                completion: Arc::new(completion),
                store: Arc::new(MemoryStore::new()),
                index: Arc::new(InMemoryVectorIndex::new()),
                launcher_unavailable: false,
            }
        }

        fn pipeline(&self) -> SearchPipeline {
            let mut launcher = FakeLauncher::new(self.browser.clone());
            launcher.unavailable = self.launcher_unavailable;
            SearchPipeline {
                launcher: Arc::new(launcher),
                completion: self.completion.clone(),
                embedder: Arc::new(HashingEmbedder),
                index: self.index.clone(),
                store: self.store.clone(),
                limits: AgentLimits {
                    settle_delay: Duration::ZERO,
                    call_timeout: Duration::from_secs(5),
                    ..AgentLimits::default()
                },
                matching: MatchingConfig::default(),
                search_url: "https://jobs.example.com/jobs/search".to_string(),
            }
        }

        async fn execute(&self, cancel: CancellationToken) -> (Uuid, Uuid, Vec<ProgressEvent>) {
            let run_id = Uuid::new_v4();
            let profile = profile();
            let profile_id = profile.id;
            let progress = Arc::new(ProgressPublisher::new(run_id));
            self.pipeline()
                .execute(run_id, profile, criteria(), progress.clone(), cancel)
                .await;
            (run_id, profile_id, progress.events())
        }
    }

    fn profile() -> CandidateProfile {
        CandidateProfile {
            id: Uuid::new_v4(),
            filename: "resume.pdf".to_string(),
            resume_text: "Rust engineer building distributed systems".to_string(),
            summary: ProfileSummary {
                skills: vec!["Rust".to_string(), "Tokio".to_string()],
                experience: "Five years of backend work".to_string(),
                education: "BSc Computer Science".to_string(),
                years_experience: Some(5.0),
            },
            embedding: HashingEmbedder::vectorize("Rust distributed systems engineer"),
            created_at: Utc::now(),
        }
    }

    fn criteria() -> SearchCriteria {
        SearchCriteria {
            keywords: "rust engineer".to_string(),
            location: "Remote".to_string(),
            experience: ExperienceLevel::Mid,
            posted_within: PostedWithin::Week,
            work_mode: WorkMode::Remote,
        }
    }

    fn terminal(events: &[ProgressEvent]) -> &TerminalPayload {
        let last = events.last().unwrap();
        assert!(last.is_terminal());
        last.payload.as_ref().unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_search_ranks_and_records_history() {
        let harness = Harness::new(FakeBrowser::paged(3, 5, 2), ScriptedCompletion::new());
        let (run_id, profile_id, events) = harness.execute(CancellationToken::new()).await;

        let TerminalPayload::Results(results) = terminal(&events) else {
            panic!("expected results, got {:?}", events.last());
        };
        assert_eq!(results.total_jobs_found, 9);
        assert!(results.candidates_scored <= 9);
        assert_eq!(results.top_jobs.len(), 9);
        assert!(results
            .top_jobs
            .windows(2)
            .all(|w| w[0].composite >= w[1].composite));
        assert!(harness.browser.is_closed());
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.windows(2).all(|w| w[0].step < w[1].step));

        assert_eq!(results.profile_id, profile_id);
        let history = harness.store.list_runs(profile_id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, run_id);
        assert_eq!(history[0].outcome, "completed");
        assert_eq!(history[0].jobs_found, 9);

        // Namespace released after retrieval.
        let leftover = harness
            .index
            .query(&format!("run-{run_id}"), &profile().embedding, 50)
            .await
            .unwrap();
        assert!(leftover.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_closes_browser_and_skips_scoring() {
        let harness = Harness::new(FakeBrowser::paged(3, 5, 0), ScriptedCompletion::new());
        let cancel = CancellationToken::new();
        harness.browser.cancel_on_click(2, cancel.clone());

        let (_, _, events) = harness.execute(cancel).await;

        assert!(matches!(terminal(&events), TerminalPayload::Cancelled { .. }));
        assert!(harness.browser.is_closed());
        assert_eq!(harness.completion.score_calls(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_browser_fails_with_capability_kind() {
        let mut harness = Harness::new(FakeBrowser::paged(1, 3, 0), ScriptedCompletion::new());
        harness.launcher_unavailable = true;

        let (run_id, profile_id, events) = harness.execute(CancellationToken::new()).await;

        let TerminalPayload::Failure { kind, .. } = terminal(&events) else {
            panic!("expected failure");
        };
        assert_eq!(*kind, FailureKind::CapabilityUnavailable);
        let history = harness.store.list_runs(profile_id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, run_id);
        assert_eq!(history[0].outcome, "failed");
    }

    #[tokio::test]
    async fn test_too_many_scoring_exclusions_fail_the_run() {
        let completion = ScriptedCompletion::new().with_scorer(|_| Reply::Malformed);
        let harness = Harness::new(FakeBrowser::paged(1, 4, 0), completion);

        let (_, _, events) = harness.execute(CancellationToken::new()).await;

        let TerminalPayload::Failure { kind, .. } = terminal(&events) else {
            panic!("expected failure");
        };
        assert_eq!(*kind, FailureKind::ScoringExclusion);
        assert!(harness.browser.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_is_retried_before_failing() {
        let harness = Harness::new(FakeBrowser::paged(1, 3, 0), ScriptedCompletion::new());
        harness.browser.set_unavailable();

        let (_, _, events) = harness.execute(CancellationToken::new()).await;

        let navigation_errors = events
            .iter()
            .filter(|e| e.stage == Stage::Browser && e.status == ProgressStatus::Error)
            .count();
        assert_eq!(navigation_errors, NAVIGATION_ATTEMPTS as usize - 1);
        let TerminalPayload::Failure { kind, .. } = terminal(&events) else {
            panic!("expected failure");
        };
        assert_eq!(*kind, FailureKind::CapabilityUnavailable);
        assert!(harness.browser.is_closed());
    }
}
