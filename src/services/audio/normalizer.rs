use std::path::{Path, PathBuf};

use log::info;

use super::format::{decode_audio_file, encode_wav_pcm16};
use super::processing::{dbfs_to_amplitude, downmix_to_mono, normalize_peak, resample};
use crate::config::AudioConfig;
use crate::errors::AppResult;
use crate::models::AudioInfo;

/// Turns an uploaded reference sample into a mono, fixed-rate, peak-normalized WAV.
#[derive(Debug, Clone)]
pub struct MediaNormalizer {
    sample_rate: u32,
    target_peak: f32,
}

impl MediaNormalizer {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            sample_rate: config.reference_sample_rate,
            target_peak: dbfs_to_amplitude(config.target_peak_dbfs),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decodes `input`, writes the normalized waveform to `output`.
    ///
    /// Undecodable input yields `UnsupportedFormat` and nothing is written.
    pub async fn normalize(&self, input: &Path, output: &Path) -> AppResult<AudioInfo> {
        let this = self.clone();
        let input: PathBuf = input.to_path_buf();
        let output: PathBuf = output.to_path_buf();
        tokio::task::spawn_blocking(move || this.normalize_blocking(&input, &output)).await?
    }

    pub fn normalize_blocking(&self, input: &Path, output: &Path) -> AppResult<AudioInfo> {
        let decoded = decode_audio_file(input)?;
        let source = decoded.info();

        let mono = downmix_to_mono(&decoded.samples, decoded.channels);
        let mut samples = resample(&mono, decoded.sample_rate, self.sample_rate)?;
        normalize_peak(&mut samples, self.target_peak);

        let written = encode_wav_pcm16(&samples, 1, self.sample_rate, output).map_err(|e| {
            let _ = std::fs::remove_file(output);
            e
        })?;

        info!(
            "Reference normalized: {} Hz/{} ch/{} ms -> {} Hz mono/{} ms",
            source.sample_rate,
            source.channels,
            source.duration_ms(),
            written.sample_rate,
            written.duration_ms()
        );
        Ok(written)
    }
}
