// Error handling module
// Contains the application error type and its conversions

use std::time::Duration;
use thiserror::Error;

use crate::models::PipelineStage;

// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model provisioning failed: {0}")]
    ModelProvision(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio processing failed: {0}")]
    AudioProcessing(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{stage} stage failed: {source}")]
    Pipeline {
        stage: PipelineStage,
        #[source]
        source: Box<AppError>,
    },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Wraps an error with the pipeline stage it happened in.
    pub fn at_stage(self, stage: PipelineStage) -> Self {
        AppError::Pipeline {
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping pipeline stage wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }

    /// The stage a pipeline error was raised in, if any.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            AppError::Pipeline { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.root(), AppError::InvalidInput(_) | AppError::NotFound(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ModelProvision(err.to_string())
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        AppError::ModelProvision(format!("archive extraction failed: {}", err))
    }
}

impl From<hound::Error> for AppError {
    fn from(err: hound::Error) -> Self {
        AppError::AudioProcessing(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Configuration(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Other(anyhow::anyhow!("background task failed: {}", err))
    }
}

// Result type alias for application
pub type AppResult<T> = Result<T, AppError>;
