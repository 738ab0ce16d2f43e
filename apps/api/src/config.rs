use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::agent::AgentLimits;
use crate::matching::MatchingConfig;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// Optional: without it profiles and run history live in memory.
    pub database_url: Option<String>,
    pub anthropic_api_key: String,
    pub webdriver_url: String,
    pub browser_headless: bool,
    /// Base URL of the job board search page; criteria are appended as query params.
    pub job_search_url: String,
    pub embedding: EmbeddingConfig,
    pub agent: AgentLimits,
    pub matching: MatchingConfig,
    pub run_retention: Duration,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_url: String,
    /// When unset the hashing embedder is used instead of the remote endpoint.
    pub api_key: Option<String>,
    pub model: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let agent_defaults = AgentLimits::default();
        let matching_defaults = MatchingConfig::default();

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            webdriver_url: env_or("WEBDRIVER_URL", "http://localhost:4444"),
            browser_headless: parse_env("BROWSER_HEADLESS", true)?,
            job_search_url: env_or("JOB_SEARCH_URL", "https://www.linkedin.com/jobs/search/"),
            embedding: EmbeddingConfig {
                api_url: env_or("EMBEDDING_API_URL", "https://api.openai.com/v1/embeddings"),
                api_key: optional_env("EMBEDDING_API_KEY"),
                model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            },
            agent: AgentLimits {
                max_pages: parse_env("AGENT_MAX_PAGES", agent_defaults.max_pages)?,
                max_reanalysis: parse_env("AGENT_MAX_REANALYSIS", agent_defaults.max_reanalysis)?,
                max_extraction_retries: parse_env(
                    "AGENT_MAX_EXTRACTION_RETRIES",
                    agent_defaults.max_extraction_retries,
                )?,
                max_items_per_page: parse_env(
                    "AGENT_MAX_ITEMS_PER_PAGE",
                    agent_defaults.max_items_per_page,
                )?,
                max_jobs: parse_env("AGENT_MAX_JOBS", agent_defaults.max_jobs)?,
                low_yield_threshold: parse_env(
                    "AGENT_LOW_YIELD_THRESHOLD",
                    agent_defaults.low_yield_threshold,
                )?,
                call_timeout: Duration::from_secs(parse_env(
                    "AGENT_CALL_TIMEOUT_SECS",
                    agent_defaults.call_timeout.as_secs(),
                )?),
                settle_delay: agent_defaults.settle_delay,
                reuse_selectors_across_pages: parse_env(
                    "AGENT_REUSE_SELECTORS",
                    agent_defaults.reuse_selectors_across_pages,
                )?,
            },
            matching: MatchingConfig {
                top_k: parse_env("MATCH_TOP_K", matching_defaults.top_k)?,
                top_n: parse_env("MATCH_TOP_N", matching_defaults.top_n)?,
                concurrency: parse_env("MATCH_CONCURRENCY", matching_defaults.concurrency)?,
                max_exclusion_rate: parse_env(
                    "MATCH_MAX_EXCLUSION_RATE",
                    matching_defaults.max_exclusion_rate,
                )?,
                call_timeout: matching_defaults.call_timeout,
            },
            run_retention: Duration::from_secs(parse_env("RUN_RETENTION_SECS", 600)?),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}
