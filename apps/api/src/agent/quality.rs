//! Quality gate: normalizes extracted candidates into `JobRecord`s, rejects
//! incomplete or duplicate ones, and decides whether the page needs another
//! extraction pass.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

use crate::agent::extractor::{ExtractionBatch, JobCandidate};
use crate::llm_client::prompts::truncate_chars;
use crate::models::job::JobRecord;

pub const MAX_DESCRIPTION_CHARS: usize = 5_000;

static RE_RELATIVE_AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\+?\s*(minute|min|hour|hr|day|week|wk|month|mo)s?\s+ago").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    RetryExtraction,
    /// Low yield persisted after the allowed retries.
    AbortPage,
}

#[derive(Debug, Clone)]
pub struct GateReport {
    pub accepted: Vec<JobRecord>,
    pub rejected: Vec<(usize, String)>,
    pub duplicates: usize,
    pub decision: GateDecision,
}

pub struct QualityGate {
    low_yield_threshold: f32,
    max_retries: u32,
}

impl QualityGate {
    pub fn new(low_yield_threshold: f32, max_retries: u32) -> Self {
        Self {
            low_yield_threshold,
            max_retries,
        }
    }

    /// `seen_urls` holds normalized URLs of records accepted earlier in the
    /// run and is extended with the newly accepted ones.
    pub fn review(
        &self,
        batch: &ExtractionBatch,
        seen_urls: &mut HashSet<String>,
        retries_used: u32,
        now: DateTime<Utc>,
    ) -> GateReport {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut duplicates = 0;

        for candidate in batch.candidates() {
            match normalize(candidate, now) {
                Ok(record) => {
                    if seen_urls.insert(record.source_url.clone()) {
                        accepted.push(record);
                    } else {
                        duplicates += 1;
                    }
                }
                Err(reason) => rejected.push((candidate.index, reason)),
            }
        }

        let low_yield = batch.is_low_yield(rejected.len(), self.low_yield_threshold);

        let decision = match (low_yield, retries_used < self.max_retries) {
            (false, _) => GateDecision::Proceed,
            (true, true) => GateDecision::RetryExtraction,
            (true, false) => GateDecision::AbortPage,
        };

        GateReport {
            accepted,
            rejected,
            duplicates,
            decision,
        }
    }
}

fn normalize(candidate: &JobCandidate, now: DateTime<Utc>) -> Result<JobRecord, String> {
    let title = clean(&candidate.title);
    let company = clean(&candidate.company);
    if title.is_empty() {
        return Err("empty title".to_string());
    }
    if company.is_empty() {
        return Err("empty company".to_string());
    }
    let source_url = normalize_url(&candidate.source_url).ok_or("unusable source url")?;

    let posted_text = candidate.posted_text.as_deref().map(clean).unwrap_or_default();
    let description = candidate
        .description
        .as_deref()
        .map(|d| truncate_chars(d.trim(), MAX_DESCRIPTION_CHARS).to_string())
        .unwrap_or_default();

    Ok(JobRecord {
        id: JobRecord::id_for_url(&source_url),
        title,
        company,
        location: candidate.location.as_deref().map(clean).unwrap_or_default(),
        compensation: candidate
            .compensation
            .as_deref()
            .map(clean)
            .filter(|c| !c.is_empty()),
        posted_at: parse_posted(&posted_text, now),
        posted_text,
        description,
        source_url,
    })
}

fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drops the fragment; the rest of the URL identifies the posting.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

/// Converts recency text like "3 days ago" into an absolute time.
pub fn parse_posted(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.to_lowercase();
    if lower.contains("just now") || lower.contains("today") || lower.contains("moments ago") {
        return Some(now);
    }
    if lower.contains("yesterday") {
        return Some(now - Duration::days(1));
    }
    let captures = RE_RELATIVE_AGE.captures(&lower)?;
    let amount: i64 = captures[1].parse().ok()?;
    let age = match &captures[2] {
        "minute" | "min" => Duration::minutes(amount),
        "hour" | "hr" => Duration::hours(amount),
        "day" => Duration::days(amount),
        "week" | "wk" => Duration::weeks(amount),
        _ => Duration::days(amount * 30),
    };
    Some(now - age)
}
