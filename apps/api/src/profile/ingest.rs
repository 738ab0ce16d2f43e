//! Turns an uploaded résumé into a stored `CandidateProfile`.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm_client::embeddings::{Embedder, EmbeddingError};
use crate::llm_client::prompts::{truncate_chars, JSON_ONLY_SYSTEM, UNTRUSTED_CONTENT_INSTRUCTION};
use crate::llm_client::{complete_as, CompletionCapability, LlmError};
use crate::models::profile::{CandidateProfile, ProfileSummary};
use crate::profile::prompts::SUMMARY_PROMPT_TEMPLATE;
use crate::storage::{Store, StoreError};

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
const MAX_PROMPT_CHARS: usize = 15_000;
const MAX_EMBEDDING_CHARS: usize = 4_000;
const MAX_SKILLS: usize = 25;

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").unwrap());

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("the uploaded document contains no text")]
    EmptyDocument,

    #[error("unsupported file `{0}`: upload a PDF or plain-text résumé")]
    UnsupportedFile(String),

    #[error("could not read PDF: {0}")]
    Extraction(String),

    #[error("résumé summary failed: {0}")]
    Summary(#[from] LlmError),

    #[error("résumé embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn is_pdf(filename: &str, content_type: Option<&str>, bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
        || content_type == Some("application/pdf")
        || filename.to_ascii_lowercase().ends_with(".pdf")
}

/// Extracts normalized text from a PDF or UTF-8 upload.
pub fn extract_text(
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<String, IngestError> {
    let raw = if is_pdf(filename, content_type, bytes) {
        pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| IngestError::Extraction(e.to_string()))?
    } else {
        std::str::from_utf8(bytes)
            .map_err(|_| IngestError::UnsupportedFile(filename.to_string()))?
            .to_string()
    };

    let text = normalize(&raw);
    if text.is_empty() {
        return Err(IngestError::EmptyDocument);
    }
    Ok(text)
}

fn normalize(raw: &str) -> String {
    let collapsed = BLANK_RUNS.replace_all(&raw.replace("\r\n", "\n"), " ").into_owned();
    BLANK_LINES
        .replace_all(&collapsed, "\n\n")
        .trim()
        .to_string()
}

fn embedding_text(summary: &ProfileSummary, resume_text: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        summary.skills.join(", "),
        summary.experience,
        summary.education,
        truncate_chars(resume_text, MAX_EMBEDDING_CHARS)
    )
}

/// Summarizes, embeds and stores the résumé text.
pub async fn ingest_profile(
    completion: &dyn CompletionCapability,
    embedder: &dyn Embedder,
    store: &dyn Store,
    filename: &str,
    resume_text: String,
) -> Result<CandidateProfile, IngestError> {
    let prompt = SUMMARY_PROMPT_TEMPLATE
        .replace("{untrusted}", UNTRUSTED_CONTENT_INSTRUCTION)
        .replace("{resume_text}", truncate_chars(&resume_text, MAX_PROMPT_CHARS));
    let mut summary: ProfileSummary = complete_as(completion, &prompt, JSON_ONLY_SYSTEM).await?;
    summary.skills.retain(|s| !s.trim().is_empty());
    summary.skills.truncate(MAX_SKILLS);
    if summary.skills.is_empty() {
        warn!("résumé summary for {filename} listed no skills");
    }

    let embedding = embedder.embed(&embedding_text(&summary, &resume_text)).await?;

    let profile = CandidateProfile {
        id: Uuid::new_v4(),
        filename: filename.to_string(),
        resume_text,
        summary,
        embedding,
        created_at: Utc::now(),
    };
    store.save_profile(&profile).await?;
    info!(
        "Stored profile {} ({} skills, {} chars)",
        profile.id,
        profile.summary.skills.len(),
        profile.resume_text.len()
    );
    Ok(profile)
}
