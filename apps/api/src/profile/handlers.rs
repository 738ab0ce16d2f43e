use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::profile::CandidateProfile;
use crate::profile::ingest::{extract_text, ingest_profile, MAX_UPLOAD_BYTES};
use crate::state::AppState;

#[derive(Serialize)]
pub struct ProfileUploadResponse {
    pub profile_id: Uuid,
    pub filename: String,
    pub text_length: usize,
    pub skills: Vec<String>,
}

struct Upload {
    filename: String,
    content_type: Option<String>,
    bytes: Bytes,
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("resume").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("failed to read upload: {e}")))?;
        return Ok(Upload {
            filename,
            content_type,
            bytes,
        });
    }
    Err(AppError::Validation(
        "multipart field `file` is required".to_string(),
    ))
}

/// POST /api/v1/profiles
pub async fn handle_upload_profile(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ProfileUploadResponse>), AppError> {
    let upload = read_upload(&mut multipart).await?;
    if upload.bytes.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".to_string()));
    }
    if upload.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation(format!(
            "uploaded file exceeds {} MB",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }

    let text = extract_text(
        &upload.filename,
        upload.content_type.as_deref(),
        &upload.bytes,
    )?;
    let profile = ingest_profile(
        state.completion.as_ref(),
        state.embedder.as_ref(),
        state.store.as_ref(),
        &upload.filename,
        text,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProfileUploadResponse {
            profile_id: profile.id,
            filename: profile.filename,
            text_length: profile.resume_text.chars().count(),
            skills: profile.summary.skills,
        }),
    ))
}

/// GET /api/v1/profiles/:id
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CandidateProfile>, AppError> {
    let profile = state
        .store
        .get_profile(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("profile {id} not found")))?;
    Ok(Json(profile))
}
