use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::utils::common::allowed_extension;

/// Output audio formats the service can deliver
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeechFormat {
    Wav,
    #[default]
    Mp3,
}

impl SpeechFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SpeechFormat::Wav => "wav",
            SpeechFormat::Mp3 => "mp3",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            SpeechFormat::Wav => "audio/wav",
            SpeechFormat::Mp3 => "audio/mpeg",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" => Some(SpeechFormat::Wav),
            "mp3" => Some(SpeechFormat::Mp3),
            _ => None,
        }
    }
}

/// Uploaded reference sample plus the text to speak
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Client-supplied file name, only its extension is trusted
    pub filename: String,
    pub audio: Bytes,
    pub text: String,
    pub requested_at: DateTime<Utc>,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>, audio: impl Into<Bytes>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            audio: audio.into(),
            text: text.into(),
            requested_at: Utc::now(),
        }
    }

    /// Checks the request invariants and returns the lowercase file extension.
    pub fn validate(&self) -> AppResult<String> {
        let extension = allowed_extension(&self.filename).ok_or_else(|| {
            AppError::InvalidInput(format!("file format not allowed: '{}'", self.filename))
        })?;

        if self.audio.is_empty() {
            return Err(AppError::InvalidInput("audio file is empty".to_string()));
        }

        if self.text.trim().is_empty() {
            return Err(AppError::InvalidInput("text is empty".to_string()));
        }

        Ok(extension)
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// Pipeline stage, used to tag errors with where they happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    ModelReady,
    Upload,
    Normalize,
    Synthesize,
    PostProcess,
    Register,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::ModelReady => "model-ready",
            PipelineStage::Upload => "upload",
            PipelineStage::Normalize => "normalize",
            PipelineStage::Synthesize => "synthesize",
            PipelineStage::PostProcess => "post-process",
            PipelineStage::Register => "register",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Normalizing,
    Synthesizing,
    PostProcessing,
    Done,
    Failed,
}

/// Per-request bookkeeping: identifier, file paths and progress
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub id: String,
    pub raw_path: PathBuf,
    pub normalized_path: PathBuf,
    pub synthesized_path: PathBuf,
    pub output_path: PathBuf,
    pub output_name: String,
    pub status: JobStatus,
}

impl PipelineJob {
    /// Lays out the job's files under `work_dir`. Names share one unique id.
    pub fn new(work_dir: &Path, upload_extension: &str, format: SpeechFormat) -> Self {
        let id = generate_job_id(Local::now());
        let output_name = format!("voice_clone_{}.{}", id, format.extension());

        Self {
            raw_path: work_dir.join(format!("upload_{}.{}", id, upload_extension)),
            normalized_path: work_dir.join(format!("converted_{}.wav", id)),
            synthesized_path: work_dir.join(format!("synth_{}.wav", id)),
            output_path: work_dir.join(&output_name),
            output_name,
            status: JobStatus::Pending,
            id,
        }
    }

    pub fn set_status(&mut self, status: JobStatus) {
        log::debug!("job {}: {:?} -> {:?}", self.id, self.status, status);
        self.status = status;
    }
}

/// Timestamp prefix keeps names sortable, the UUID keeps them unique within the same second.
pub fn generate_job_id(now: DateTime<Local>) -> String {
    format!("{}_{}", now.format("%Y%m%d_%H%M%S"), Uuid::new_v4().simple())
}

/// A finished, stored output file
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub format: Option<SpeechFormat>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// What the caller gets back: the artifact name and where to fetch it
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArtifactReference {
    pub name: String,
    pub url: String,
}

/// Basic facts about a decoded or written waveform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Number of frames (samples per channel)
    pub frames: usize,
}

impl AudioInfo {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames as u64 * 1000) / self.sample_rate as u64
    }
}
