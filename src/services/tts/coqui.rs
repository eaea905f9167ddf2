// Coqui TTS engine, driven through its `tts` command line

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::process::Command;

use super::{SynthesisEngine, SynthesisRequest};
use crate::errors::{AppError, AppResult};
use crate::services::model::{ModelBundle, ModelLoader};
use crate::utils::common::check_file_exists_and_valid;

/// Сколько последних символов stderr попадает в текст ошибки
const STDERR_TAIL: usize = 600;

pub struct CoquiCliEngine {
    program: PathBuf,
    model_path: PathBuf,
    config_path: PathBuf,
    use_cuda: bool,
}

impl CoquiCliEngine {
    pub fn new(program: PathBuf, bundle: &ModelBundle, use_cuda: bool) -> Self {
        Self {
            program,
            model_path: bundle.weights_path().to_path_buf(),
            config_path: bundle.config_path().to_path_buf(),
            use_cuda,
        }
    }

    fn args(&self, request: &SynthesisRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--text".into(),
            request.text.clone().into(),
            "--model_path".into(),
            self.model_path.clone().into(),
            "--config_path".into(),
            self.config_path.clone().into(),
            "--speaker_wav".into(),
            request.speaker_wav.clone().into(),
            "--language_idx".into(),
            request.language.clone().into(),
            "--out_path".into(),
            request.output_path.clone().into(),
        ];
        if self.use_cuda {
            args.push("--use_cuda".into());
            args.push("true".into());
        }
        args
    }
}

#[async_trait::async_trait]
impl SynthesisEngine for CoquiCliEngine {
    async fn synthesize(&self, request: &SynthesisRequest) -> AppResult<()> {
        debug!(
            "Запуск {} для {} символов текста",
            self.program.display(),
            request.text.chars().count()
        );

        // kill_on_drop: процесс завершается, если запрос отменен по таймауту
        let output = Command::new(&self.program)
            .args(self.args(request))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AppError::Synthesis(format!("failed to start {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            error!("TTS engine stderr: {}", stderr);
            let tail: String = {
                let skip = stderr.chars().count().saturating_sub(STDERR_TAIL);
                stderr.chars().skip(skip).collect()
            };
            return Err(AppError::Synthesis(format!(
                "engine exited with {}: {}",
                output.status, tail
            )));
        }

        if !check_file_exists_and_valid(&request.output_path).await {
            return Err(AppError::Synthesis(format!(
                "engine produced no audio at {}",
                request.output_path.display()
            )));
        }

        info!("Синтез завершен: {}", request.output_path.display());
        Ok(())
    }
}

/// Resolves the `tts` executable once and binds it to a bundle.
pub struct CoquiLoader {
    program: String,
    use_cuda: bool,
}

impl CoquiLoader {
    pub fn new(program: impl Into<String>, use_cuda: bool) -> Self {
        Self {
            program: program.into(),
            use_cuda,
        }
    }
}

#[async_trait::async_trait]
impl ModelLoader for CoquiLoader {
    async fn load(&self, bundle: &ModelBundle) -> AppResult<Arc<dyn SynthesisEngine>> {
        let program = which::which(&self.program).map_err(|e| {
            AppError::ModelLoad(format!("synthesis runtime '{}' not found: {}", self.program, e))
        })?;
        info!(
            "Модель {} будет запущена через {}",
            bundle.dir().display(),
            program.display()
        );
        Ok(Arc::new(CoquiCliEngine::new(program, bundle, self.use_cuda)))
    }
}
