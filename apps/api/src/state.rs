use std::sync::Arc;

use crate::llm_client::embeddings::Embedder;
use crate::llm_client::CompletionCapability;
use crate::search::pipeline::SearchPipeline;
use crate::search::registry::RunRegistry;
use crate::storage::Store;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub completion: Arc<dyn CompletionCapability>,
    pub embedder: Arc<dyn Embedder>,
    /// Shared by every run; each run gets its own browser session and index namespace.
    pub pipeline: Arc<SearchPipeline>,
    pub registry: Arc<RunRegistry>,
}
