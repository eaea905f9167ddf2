use std::path::{Path, PathBuf};

use log::{debug, info};

use super::ffmpeg;
use super::format::{decode_audio_file, encode_wav_pcm16};
use super::processing::append_silence;
use crate::config::AudioConfig;
use crate::errors::AppResult;
use crate::models::{AudioInfo, SpeechFormat};

/// Pads synthesized speech with trailing silence and encodes the delivery file.
#[derive(Debug, Clone)]
pub struct AudioPostProcessor {
    silence_ms: u32,
    format: SpeechFormat,
    ffmpeg_program: String,
}

impl AudioPostProcessor {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            silence_ms: config.trailing_silence_ms,
            format: config.delivery_format,
            ffmpeg_program: config.ffmpeg_program.clone(),
        }
    }

    pub fn format(&self) -> SpeechFormat {
        self.format
    }

    /// Writes `input` plus the configured silence to `output` in the delivery format.
    /// Returns the facts of the padded waveform.
    pub async fn finalize(&self, input: &Path, output: &Path) -> AppResult<AudioInfo> {
        let silence_ms = self.silence_ms;

        match self.format {
            SpeechFormat::Wav => {
                let (input, output) = (input.to_path_buf(), output.to_path_buf());
                tokio::task::spawn_blocking(move || pad_to_wav(&input, &output, silence_ms)).await?
            }
            SpeechFormat::Mp3 => {
                let padded = intermediate_path(output);
                let (src, dst) = (input.to_path_buf(), padded.clone());
                let info =
                    tokio::task::spawn_blocking(move || pad_to_wav(&src, &dst, silence_ms)).await??;

                let encoded = ffmpeg::encode_mp3(&self.ffmpeg_program, &padded, output).await;
                let _ = tokio::fs::remove_file(&padded).await;
                encoded?;

                info!("Encoded {} ({} ms)", output.display(), info.duration_ms());
                Ok(info)
            }
        }
    }
}

fn intermediate_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{}.padded.wav", stem))
}

fn pad_to_wav(input: &Path, output: &Path, silence_ms: u32) -> AppResult<AudioInfo> {
    let mut decoded = decode_audio_file(input)?;
    let added = append_silence(
        &mut decoded.samples,
        decoded.channels,
        decoded.sample_rate,
        silence_ms,
    );
    debug!("Appended {} frames of silence to {}", added, input.display());

    encode_wav_pcm16(&decoded.samples, decoded.channels, decoded.sample_rate, output)
}
