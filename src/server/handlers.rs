use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use log::info;
use serde::Serialize;

use super::{ApiError, AppState};
use crate::models::UploadRequest;
use crate::services::storage::content_type_for;

#[derive(Debug, Serialize)]
pub struct CloneVoiceResponse {
    pub success: bool,
    pub audio_url: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_ready: bool,
    pub model_loads: usize,
}

/// POST /api/clone-voice, multipart fields `audio` (file) and `text`
pub async fn clone_voice(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<CloneVoiceResponse>, ApiError> {
    let limit = state.config.max_upload_bytes;
    let mut audio: Option<(String, Bytes)> = None;
    let mut text: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("invalid multipart", e, limit))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "audio" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("audio read error", e, limit))?;
                audio = Some((filename, bytes));
            }
            "text" => {
                text = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| multipart_error("text read error", e, limit))?,
                );
            }
            _ => {}
        }
    }

    let (filename, audio) = audio.ok_or_else(|| ApiError::bad_request("audio file is required"))?;
    let text = text.ok_or_else(|| ApiError::bad_request("text is required"))?;

    let reference = state
        .pipeline
        .convert(UploadRequest::new(filename, audio, text))
        .await?;

    Ok(Json(CloneVoiceResponse {
        success: true,
        audio_url: reference.url,
    }))
}

/// Превышение DefaultBodyLimit отдается как 413, остальное как 400
fn multipart_error(context: &str, err: MultipartError, limit: usize) -> ApiError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(status, format!("upload exceeds the {limit} byte limit"))
    } else {
        ApiError::new(status, format!("{context}: {}", err.body_text()))
    }
}

/// GET /api/audio/:name
pub async fn get_audio(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let data = state.store.get(&name).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&name))], data).into_response())
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model_ready: state.models.is_ready(),
        model_loads: state.models.model_loads(),
    })
}

/// GET /, the static landing page
pub async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    let path = state.config.frontend_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Ok(Html(page)),
        Err(e) => {
            info!("Landing page {} unavailable: {}", path.display(), e);
            Err(ApiError::not_found("index.html not found"))
        }
    }
}
