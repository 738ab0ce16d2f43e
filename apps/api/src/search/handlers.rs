use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::progress::ProgressEvent;
use crate::models::search::{SearchCriteria, SearchRunRow};
use crate::search::registry::RunHandle;
use crate::state::AppState;

const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Deserialize)]
pub struct SearchRequest {
    pub profile_id: Uuid,
    #[serde(flatten)]
    pub criteria: SearchCriteria,
}

#[derive(Serialize)]
pub struct SearchAccepted {
    pub run_id: Uuid,
    pub events_url: String,
}

#[derive(Serialize)]
pub struct SearchStatus {
    pub run_id: Uuid,
    pub profile_id: Uuid,
    pub finished: bool,
    pub elapsed_seconds: f64,
    pub events: Vec<ProgressEvent>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub profile_id: Uuid,
    pub limit: Option<i64>,
}

async fn find_run(state: &AppState, run_id: Uuid) -> Result<RunHandle, AppError> {
    state
        .registry
        .get(run_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("search run {run_id} not found")))
}

/// POST /api/v1/search
pub async fn handle_start_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<(StatusCode, Json<SearchAccepted>), AppError> {
    req.criteria.validate().map_err(AppError::Validation)?;
    let profile = state
        .store
        .get_profile(req.profile_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("profile {} not found", req.profile_id)))?;

    let run_id = Uuid::new_v4();
    let handle = state.registry.register(run_id, profile.id).await;
    let pipeline = Arc::clone(&state.pipeline);
    let criteria = req.criteria;
    tokio::spawn(async move {
        pipeline
            .execute(run_id, profile, criteria, handle.progress, handle.cancel)
            .await;
    });
    info!(%run_id, profile_id = %req.profile_id, "search accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SearchAccepted {
            run_id,
            events_url: format!("/api/v1/search/{run_id}/events"),
        }),
    ))
}

/// GET /api/v1/search/:run_id
pub async fn handle_search_status(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<SearchStatus>, AppError> {
    let handle = find_run(&state, run_id).await?;
    Ok(Json(SearchStatus {
        run_id,
        profile_id: handle.profile_id,
        finished: handle.progress.is_closed(),
        elapsed_seconds: handle.started_at.elapsed().as_secs_f64(),
        events: handle.progress.events(),
    }))
}

/// GET /api/v1/search/:run_id/events
/// Replays the run's progress then follows it live. Reconnecting clients
/// send `Last-Event-ID` to resume after the last step they saw.
pub async fn handle_search_events(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let handle = find_run(&state, run_id).await?;
    let last_step = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(0);

    let stream = handle
        .progress
        .subscribe(last_step)
        .map(|event| Ok(progress_to_sse(&event)));
    Ok(Sse::new(stream).keep_alive(default_keep_alive()))
}

/// POST /api/v1/search/:run_id/cancel
pub async fn handle_cancel_search(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    if !state.registry.cancel(run_id).await {
        return Err(AppError::NotFound(format!("search run {run_id} not found")));
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "run_id": run_id, "status": "cancelling" })),
    ))
}

/// GET /api/v1/search/history
pub async fn handle_search_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<SearchRunRow>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let runs = state.store.list_runs(params.profile_id, limit).await?;
    Ok(Json(runs))
}

fn progress_to_sse(event: &ProgressEvent) -> Event {
    let sse = Event::default()
        .event(event.event_name())
        .id(event.step.to_string());
    match serde_json::to_string(event) {
        Ok(data) => sse.data(data),
        Err(err) => {
            warn!("failed to serialize progress event {}: {err}", event.step);
            sse.data(event.message.clone())
        }
    }
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
