//! Orchestrator: the state machine that drives one browsing run.
//!
//! ```text
//! Analyzing -> Validating -> Extracting -> QualityGating -> Paginating
//!     ^            |  ^                        |               |
//!     +------------+  |                        v               v
//!     (re-analysis)   +---- (reused set) -- Extracting     Analyzing | Done
//! ```
//!
//! Three independent bounds guarantee termination: re-analysis attempts per
//! page, extraction retries per page and total pages. A fatal error ends the
//! run by returning `Err`; the caller turns it into the terminal event.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::agent::analyzer::Analyzer;
use crate::agent::context::{AnalysisFeedback, RunContext, StopReason};
use crate::agent::extractor::Extractor;
use crate::agent::pagination::{PageTurn, Paginator};
use crate::agent::quality::{GateDecision, QualityGate};
use crate::agent::selectors::SelectorSet;
use crate::agent::validator::Validator;
use crate::agent::{AgentError, AgentLimits, CallGuard, Capability};
use crate::browser::BrowserSession;
use crate::llm_client::CompletionCapability;
use crate::models::job::JobRecord;
use crate::models::progress::{ProgressStatus, Stage};
use crate::progress::ProgressPublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Analyzing,
    Validating,
    Extracting,
    QualityGating,
    Paginating,
    Done,
}

impl RunState {
    fn stage(self) -> Stage {
        match self {
            RunState::Analyzing => Stage::Analyzing,
            RunState::Validating => Stage::Validating,
            RunState::Extracting => Stage::Extracting,
            RunState::QualityGating => Stage::QualityGate,
            RunState::Paginating => Stage::Paginating,
            RunState::Done => Stage::Browser,
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub records: Vec<JobRecord>,
    pub pages_visited: u32,
    pub stop_reason: Option<StopReason>,
}

pub struct Orchestrator {
    browser: Arc<dyn BrowserSession>,
    analyzer: Analyzer,
    validator: Validator,
    extractor: Extractor,
    gate: QualityGate,
    paginator: Paginator,
    limits: AgentLimits,
    progress: Arc<ProgressPublisher>,
}

impl Orchestrator {
    pub fn new(
        browser: Arc<dyn BrowserSession>,
        completion: Arc<dyn CompletionCapability>,
        limits: AgentLimits,
        progress: Arc<ProgressPublisher>,
    ) -> Self {
        Self {
            browser,
            analyzer: Analyzer::new(completion),
            validator: Validator::new(limits.settle_delay),
            extractor: Extractor::new(limits.settle_delay),
            gate: QualityGate::new(limits.low_yield_threshold, limits.max_extraction_retries),
            paginator: Paginator::new(limits.clone()),
            limits,
            progress,
        }
    }

    /// Runs the browsing loop on the already-navigated session.
    pub async fn run(&self, guard: &CallGuard) -> Result<RunOutcome, AgentError> {
        let mut ctx = RunContext::new();
        let mut state = RunState::Analyzing;
        self.progress.publish(
            Stage::Analyzing,
            ProgressStatus::Processing,
            "Analyzing structure of page 1",
        );

        loop {
            guard.check()?;
            let (next, message) = match self.step(state, &mut ctx, guard).await {
                Ok(transition) => transition,
                Err(error) => {
                    if !error.is_cancelled() {
                        warn!("browsing failed in {state:?}: {error}");
                        self.progress.publish(
                            state.stage(),
                            ProgressStatus::Error,
                            format!("Browsing failed: {error}"),
                        );
                    }
                    return Err(error);
                }
            };

            state = next;
            if state == RunState::Done {
                info!("browsing done: {message}");
                self.progress
                    .publish(state.stage(), ProgressStatus::Completed, message);
                return Ok(RunOutcome {
                    records: ctx.records,
                    pages_visited: ctx.page_number,
                    stop_reason: ctx.stop_reason,
                });
            }
            self.progress
                .publish(state.stage(), ProgressStatus::Processing, message);
        }
    }

    async fn step(
        &self,
        state: RunState,
        ctx: &mut RunContext,
        guard: &CallGuard,
    ) -> Result<(RunState, String), AgentError> {
        let browser = self.browser.as_ref();
        match state {
            RunState::Analyzing => {
                let feedback = ctx.feedback.take();
                let analyzed = self.analyzer.analyze(browser, feedback.as_ref(), guard).await;
                match analyzed {
                    Ok(set) => {
                        let message = format!(
                            "Validating {} selectors (confidence {:.2})",
                            set.len(),
                            set.confidence
                        );
                        ctx.selectors = Some(set);
                        Ok((RunState::Validating, message))
                    }
                    Err(error) if analysis_is_retryable(&error) => {
                        let previous = feedback.and_then(|f| f.previous);
                        self.reanalyze(ctx, state, error, previous)
                    }
                    Err(error) => Err(error),
                }
            }

            RunState::Validating => {
                let Some(set) = ctx.selectors.take() else {
                    return Ok((RunState::Analyzing, "No selectors to validate".to_string()));
                };
                match self.validator.validate(browser, set.clone(), guard).await {
                    Ok(validated) => {
                        ctx.selectors = Some(validated);
                        Ok((
                            RunState::Extracting,
                            format!("Extracting jobs from page {}", ctx.page_number),
                        ))
                    }
                    Err(error @ (AgentError::Validation(_) | AgentError::Timeout { .. })) => {
                        self.reanalyze(ctx, state, error, Some(set))
                    }
                    Err(error) => Err(error),
                }
            }

            RunState::Extracting => {
                let Some(set) = ctx.selectors.as_ref() else {
                    return Ok((RunState::Analyzing, "Selectors missing".to_string()));
                };
                let capacity = self
                    .limits
                    .max_items_per_page
                    .min(self.limits.max_jobs.saturating_sub(ctx.records.len()));
                let batch = self.extractor.extract(browser, set, capacity, guard).await?;
                let message = format!(
                    "Read {} of {} job cards on page {}",
                    batch.attempted() - batch.skipped(),
                    batch.attempted(),
                    ctx.page_number
                );
                ctx.pending_batch = Some(batch);
                Ok((RunState::QualityGating, message))
            }

            RunState::QualityGating => {
                let batch = ctx.pending_batch.take().unwrap_or_default();
                let report =
                    self.gate
                        .review(&batch, &mut ctx.seen_urls, ctx.extraction_retries, Utc::now());
                let accepted = report.accepted.len();
                ctx.accepted_on_page += accepted;
                ctx.records.extend(report.accepted);

                let summary = format!(
                    "Accepted {accepted} jobs on page {} ({} rejected, {} duplicates, {} total)",
                    ctx.page_number,
                    report.rejected.len(),
                    report.duplicates,
                    ctx.records.len()
                );
                match report.decision {
                    GateDecision::Proceed => Ok((RunState::Paginating, summary)),
                    GateDecision::RetryExtraction => {
                        ctx.extraction_retries += 1;
                        self.progress.publish(
                            Stage::QualityGate,
                            ProgressStatus::Error,
                            format!("{summary}; low yield, extracting again"),
                        );
                        Ok((
                            RunState::Extracting,
                            format!("Retrying extraction on page {}", ctx.page_number),
                        ))
                    }
                    GateDecision::AbortPage => {
                        self.progress.publish(
                            Stage::QualityGate,
                            ProgressStatus::Error,
                            format!("{summary}; yield stayed low, leaving page"),
                        );
                        ctx.stop_reason = Some(StopReason::LowYield);
                        Ok((RunState::Paginating, summary))
                    }
                }
            }

            RunState::Paginating => {
                ctx.close_page();
                if let Some(reason) = self.paginator.should_stop(ctx) {
                    return Ok(self.finish(ctx, reason));
                }
                match self
                    .paginator
                    .advance(browser, ctx.selectors.as_ref(), guard)
                    .await?
                {
                    PageTurn::Stop(reason) => {
                        if reason == StopReason::NavigationTimeout {
                            self.progress.publish(
                                Stage::Paginating,
                                ProgressStatus::Error,
                                "Next page did not load in time",
                            );
                        }
                        Ok(self.finish(ctx, reason))
                    }
                    PageTurn::Continue { reuse_selectors } => {
                        ctx.begin_page(reuse_selectors);
                        if reuse_selectors && ctx.selectors.is_some() {
                            Ok((
                                RunState::Validating,
                                format!("Re-validating selectors on page {}", ctx.page_number),
                            ))
                        } else {
                            Ok((
                                RunState::Analyzing,
                                format!("Analyzing structure of page {}", ctx.page_number),
                            ))
                        }
                    }
                }
            }

            RunState::Done => Ok((RunState::Done, "Browsing finished".to_string())),
        }
    }

    /// Records a recoverable analysis or validation failure and either loops
    /// back to the analyzer or, once the page's budget is spent, fails.
    fn reanalyze(
        &self,
        ctx: &mut RunContext,
        state: RunState,
        error: AgentError,
        previous: Option<SelectorSet>,
    ) -> Result<(RunState, String), AgentError> {
        let used = ctx.reanalysis_count;
        let budget = self.limits.max_reanalysis;
        if used >= budget {
            return Err(AgentError::Exhausted {
                attempts: used + 1,
                last: Box::new(error),
            });
        }

        self.progress.publish(
            state.stage(),
            ProgressStatus::Error,
            format!("{error}; re-analyzing ({}/{budget})", used + 1),
        );
        let failures = match &error {
            AgentError::Validation(failures) => failures.iter().map(ToString::to_string).collect(),
            other => vec![other.to_string()],
        };
        ctx.reanalysis_count += 1;
        ctx.feedback = Some(AnalysisFeedback { previous, failures });
        Ok((
            RunState::Analyzing,
            format!("Re-analyzing page {}", ctx.page_number),
        ))
    }

    fn finish(&self, ctx: &mut RunContext, reason: StopReason) -> (RunState, String) {
        // A low-yield last page keeps that reason unless a hard limit hit.
        if ctx.stop_reason.is_none() || reason != StopReason::NoNextControl {
            ctx.stop_reason = Some(reason);
        }
        (
            RunState::Done,
            format!(
                "Browsing finished after {} pages ({}); {} jobs collected",
                ctx.page_number,
                reason.describe(),
                ctx.records.len()
            ),
        )
    }
}

fn analysis_is_retryable(error: &AgentError) -> bool {
    matches!(
        error,
        AgentError::Timeout { .. }
            | AgentError::Schema(_)
            | AgentError::Unavailable {
                capability: Capability::Completion,
                ..
            }
    )
}
