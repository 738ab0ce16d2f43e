//! Scoring engine: rates each shortlisted job against the candidate with a
//! fixed rubric and ranks the results.
//!
//! Composite = (0.4·skills + 0.3·experience + 0.2·education + 0.1·overall)
//! on the 0–10 sub-score scale, multiplied by 10 and rounded to one decimal.
//! A candidate whose answer is malformed or out of range is excluded rather
//! than failing the batch, up to the configured exclusion rate.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::llm_client::prompts::{truncate_chars, UNTRUSTED_CONTENT_INSTRUCTION};
use crate::llm_client::CompletionCapability;
use crate::matching::prompts::{SCORE_PROMPT_TEMPLATE, SCORE_SYSTEM};
use crate::matching::retrieval::Candidate;
use crate::matching::MatchingConfig;
use crate::models::job::{ScoredJob, SubScores};
use crate::models::profile::CandidateProfile;
use crate::models::progress::{ProgressStatus, Stage};
use crate::progress::ProgressPublisher;

const WEIGHT_SKILLS: f32 = 0.4;
const WEIGHT_EXPERIENCE: f32 = 0.3;
const WEIGHT_EDUCATION: f32 = 0.2;
const WEIGHT_OVERALL: f32 = 0.1;
const MAX_SUB_SCORE: f32 = 10.0;
const RESUME_EXCERPT_CHARS: usize = 3_000;
const DESCRIPTION_CHARS: usize = 2_000;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("{excluded} of {total} candidates could not be scored (allowed {allowed:.0}%)")]
    TooManyExclusions {
        excluded: usize,
        total: usize,
        allowed: f32,
    },

    #[error("scoring cancelled")]
    Cancelled,
}

#[derive(Debug, Deserialize)]
struct RubricAnswer {
    skills_match: Option<Value>,
    experience_match: Option<Value>,
    education_match: Option<Value>,
    overall_fit: Option<Value>,
    #[serde(default)]
    rationale: String,
}

#[derive(Debug)]
pub struct ScoringReport {
    /// Best first, truncated to top-N.
    pub ranked: Vec<ScoredJob>,
    pub scored: usize,
    pub excluded: usize,
}

enum Outcome {
    Scored(ScoredJob),
    Excluded(String),
    Cancelled,
}

pub struct ScoringEngine {
    completion: Arc<dyn CompletionCapability>,
    top_n: usize,
    concurrency: usize,
    max_exclusion_rate: f32,
    call_timeout: Duration,
}

impl ScoringEngine {
    pub fn new(completion: Arc<dyn CompletionCapability>, config: &MatchingConfig) -> Self {
        Self {
            completion,
            top_n: config.top_n,
            concurrency: config.concurrency.max(1),
            max_exclusion_rate: config.max_exclusion_rate,
            call_timeout: config.call_timeout,
        }
    }

    pub async fn score(
        &self,
        profile: &CandidateProfile,
        candidates: Vec<Candidate>,
        progress: &ProgressPublisher,
        cancel: &CancellationToken,
    ) -> Result<ScoringReport, ScoringError> {
        let total = candidates.len();
        if total == 0 {
            return Ok(ScoringReport {
                ranked: Vec::new(),
                scored: 0,
                excluded: 0,
            });
        }

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let tasks = candidates.into_iter().map(|candidate| {
            let permits = Arc::clone(&permits);
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Outcome::Cancelled;
                };
                // No new completion calls once the run is cancelled.
                if cancel.is_cancelled() {
                    return Outcome::Cancelled;
                }
                self.score_one(profile, candidate).await
            }
        });

        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScoringError::Cancelled),
            outcomes = join_all(tasks) => outcomes,
        };

        let mut ranked = Vec::with_capacity(total);
        let mut excluded = 0;
        for outcome in outcomes {
            match outcome {
                Outcome::Scored(job) => ranked.push(job),
                Outcome::Excluded(reason) => {
                    excluded += 1;
                    progress.publish(Stage::Scoring, ProgressStatus::Error, reason);
                }
                Outcome::Cancelled => return Err(ScoringError::Cancelled),
            }
        }

        if excluded as f32 / total as f32 > self.max_exclusion_rate {
            return Err(ScoringError::TooManyExclusions {
                excluded,
                total,
                allowed: self.max_exclusion_rate * 100.0,
            });
        }

        ranked.sort_by(|a, b| {
            b.composite
                .total_cmp(&a.composite)
                .then_with(|| b.scores.skills.total_cmp(&a.scores.skills))
                .then_with(|| b.similarity.total_cmp(&a.similarity))
        });
        let scored = ranked.len();
        ranked.truncate(self.top_n);
        info!("scored {scored} of {total} candidates, {excluded} excluded");

        Ok(ScoringReport {
            ranked,
            scored,
            excluded,
        })
    }

    async fn score_one(&self, profile: &CandidateProfile, candidate: Candidate) -> Outcome {
        let prompt = build_prompt(profile, &candidate);
        let label = format!("{} at {}", candidate.job.title, candidate.job.company);

        let answer = match tokio::time::timeout(
            self.call_timeout,
            self.completion.complete(&prompt, SCORE_SYSTEM),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => return exclude(&label, &e.to_string()),
            Err(_) => return exclude(&label, "scoring call timed out"),
        };

        match parse_scores(answer) {
            Ok((scores, rationale)) => Outcome::Scored(ScoredJob {
                composite: composite(&scores),
                scores,
                similarity: candidate.similarity,
                rationale,
                job: candidate.job,
            }),
            Err(reason) => exclude(&label, &reason),
        }
    }
}

fn exclude(label: &str, reason: &str) -> Outcome {
    warn!("excluding {label} from ranking: {reason}");
    Outcome::Excluded(format!("Could not score {label}: {reason}"))
}

fn build_prompt(profile: &CandidateProfile, candidate: &Candidate) -> String {
    let summary = &profile.summary;
    let job = &candidate.job;
    SCORE_PROMPT_TEMPLATE
        .replace("{skills}", &summary.skills.join(", "))
        .replace("{experience}", &summary.experience)
        .replace("{education}", &summary.education)
        .replace("{untrusted}", UNTRUSTED_CONTENT_INSTRUCTION)
        .replace(
            "{resume_excerpt}",
            truncate_chars(&profile.resume_text, RESUME_EXCERPT_CHARS),
        )
        .replace("{title}", &job.title)
        .replace("{company}", &job.company)
        .replace("{location}", &job.location)
        .replace("{description}", truncate_chars(&job.description, DESCRIPTION_CHARS))
}

fn parse_scores(answer: Value) -> Result<(SubScores, String), String> {
    let answer: RubricAnswer =
        serde_json::from_value(answer).map_err(|e| format!("malformed answer: {e}"))?;
    let scores = SubScores {
        skills: sub_score("skills_match", answer.skills_match)?,
        experience: sub_score("experience_match", answer.experience_match)?,
        education: sub_score("education_match", answer.education_match)?,
        overall: sub_score("overall_fit", answer.overall_fit)?,
    };
    Ok((scores, answer.rationale.trim().to_string()))
}

fn sub_score(name: &str, value: Option<Value>) -> Result<f32, String> {
    let value = value.ok_or_else(|| format!("{name} missing"))?;
    let score = value
        .as_f64()
        .ok_or_else(|| format!("{name} is not a number: {value}"))? as f32;
    if !(0.0..=MAX_SUB_SCORE).contains(&score) {
        return Err(format!("{name} out of range: {score}"));
    }
    Ok(score)
}

/// Weighted composite on the 0–100 scale, rounded to one decimal.
pub fn composite(scores: &SubScores) -> f32 {
    let weighted = WEIGHT_SKILLS * scores.skills
        + WEIGHT_EXPERIENCE * scores.experience
        + WEIGHT_EDUCATION * scores.education
        + WEIGHT_OVERALL * scores.overall;
    (weighted * 10.0 * 10.0).round() / 10.0
}
