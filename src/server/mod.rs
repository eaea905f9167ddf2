// HTTP surface: routes, shared state and error responses

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, warn};
use serde::Serialize;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::model::ModelManager;
use crate::services::pipeline::ConversionPipeline;
use crate::services::storage::ArtifactStore;

pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<ConversionPipeline>,
    pub store: Arc<dyn ArtifactStore>,
    pub models: Arc<ModelManager>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, models: Arc<ModelManager>, store: Arc<dyn ArtifactStore>) -> Self {
        let pipeline = Arc::new(ConversionPipeline::new(config.clone(), models.clone(), store.clone()));
        Self {
            config,
            pipeline,
            store,
            models,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/clone-voice", post(handlers::clone_voice))
        .route("/api/audio/:name", get(handlers::get_audio))
        .route("/api/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(Arc::new(state))
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Error body `{"error": ...}` with the status derived from the root cause
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = match err.root() {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            warn!("Request rejected: {}", err);
        }

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
