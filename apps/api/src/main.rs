mod agent;
mod browser;
mod config;
mod db;
mod errors;
mod llm_client;
mod matching;
mod models;
mod profile;
mod progress;
mod routes;
mod search;
mod state;
mod storage;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::browser::webdriver::WebDriverLauncher;
use crate::config::Config;
use crate::db::open_store;
use crate::llm_client::embeddings::{Embedder, HashingEmbedder, OpenAiEmbedder};
use crate::llm_client::LlmClient;
use crate::matching::index::InMemoryVectorIndex;
use crate::routes::build_router;
use crate::search::pipeline::SearchPipeline;
use crate::search::registry::RunRegistry;
use crate::state::AppState;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobScout API v{}", env!("CARGO_PKG_VERSION"));

    // Profiles and search history
    let store = open_store(config.database_url.as_deref()).await?;

    // Completion capability
    let completion = Arc::new(LlmClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Embedding capability
    let embedder: Arc<dyn Embedder> = match &config.embedding.api_key {
        Some(key) => {
            info!("Embedding endpoint: {} ({})", config.embedding.api_url, config.embedding.model);
            Arc::new(OpenAiEmbedder::new(
                config.embedding.api_url.clone(),
                key.clone(),
                config.embedding.model.clone(),
            )?)
        }
        None => {
            info!("EMBEDDING_API_KEY not set; using the local hashing embedder");
            Arc::new(HashingEmbedder)
        }
    };

    // Browser capability
    let launcher = Arc::new(WebDriverLauncher::new(
        config.webdriver_url.clone(),
        config.browser_headless,
    )?);
    info!("WebDriver endpoint: {}", config.webdriver_url);

    let pipeline = SearchPipeline {
        launcher,
        completion: completion.clone(),
        embedder: embedder.clone(),
        index: Arc::new(InMemoryVectorIndex::new()),
        store: store.clone(),
        limits: config.agent.clone(),
        matching: config.matching.clone(),
        search_url: config.job_search_url.clone(),
    };
    let registry = Arc::new(RunRegistry::new(config.run_retention));
    spawn_registry_pruner(Arc::clone(&registry));

    // Build app state
    let state = AppState {
        store,
        completion,
        embedder,
        pipeline: Arc::new(pipeline),
        registry,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically drops finished runs past their retention period.
fn spawn_registry_pruner(registry: Arc<RunRegistry>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            registry.prune().await;
        }
    });
}
