// TTS services module
// Voice-cloning synthesis engines

use std::path::PathBuf;

use crate::errors::AppResult;

pub mod coqui;

pub use coqui::{CoquiCliEngine, CoquiLoader};

/// One synthesis call: text spoken in the voice of `speaker_wav`
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    /// Normalized reference sample
    pub speaker_wav: PathBuf,
    pub language: String,
    pub output_path: PathBuf,
}

/// Trait that all synthesis engines must implement
///
/// On success the engine must have written a WAV file to `request.output_path`.
#[async_trait::async_trait]
pub trait SynthesisEngine: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> AppResult<()>;
}
