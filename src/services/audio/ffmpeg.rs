// Обертка над ffmpeg для финального кодирования в MP3

use std::path::{Path, PathBuf};

use log::{debug, error};
use tokio::process::Command;

use crate::errors::{AppError, AppResult};

/// Находит исполняемый файл ffmpeg в PATH (или по явному пути).
pub fn locate(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Запускает ffmpeg с аргументами и проверяет код возврата.
pub async fn run_ffmpeg_command(program: &str, args: &[&str]) -> AppResult<()> {
    debug!("{} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| AppError::AudioProcessing(format!("Failed to start {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("FFmpeg stderr: {}", stderr.trim());
        return Err(AppError::AudioProcessing(format!(
            "FFmpeg command failed with status: {}",
            output.status
        )));
    }

    Ok(())
}

/// Кодирует WAV в MP3 (libmp3lame, VBR ~190 кбит/с).
pub async fn encode_mp3(program: &str, input: &Path, output: &Path) -> AppResult<()> {
    let input = input.to_string_lossy();
    let output = output.to_string_lossy();
    let args = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-i",
        &*input,
        "-codec:a",
        "libmp3lame",
        "-q:a",
        "2",
        &*output,
    ];

    run_ffmpeg_command(program, &args).await
}
