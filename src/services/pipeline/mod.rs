//! # Conversion pipeline
//!
//! Один запрос: загрузка образца голоса → нормализация → синтез →
//! постобработка → регистрация результата в хранилище.
//!
//! Каждая ошибка шага оборачивается в `AppError::Pipeline` с именем шага.
//! Промежуточные файлы синтеза удаляются; исходная загрузка и
//! нормализованный образец остаются в рабочем каталоге.

use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{ArtifactReference, JobStatus, PipelineJob, PipelineStage, UploadRequest};
use crate::services::audio::{AudioPostProcessor, MediaNormalizer};
use crate::services::model::{ModelHandle, ModelManager};
use crate::services::storage::ArtifactStore;

pub struct ConversionPipeline {
    config: Arc<AppConfig>,
    models: Arc<ModelManager>,
    store: Arc<dyn ArtifactStore>,
    normalizer: MediaNormalizer,
    postprocessor: AudioPostProcessor,
    work_dir: PathBuf,
}

impl ConversionPipeline {
    pub fn new(config: Arc<AppConfig>, models: Arc<ModelManager>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            normalizer: MediaNormalizer::new(&config.audio),
            postprocessor: AudioPostProcessor::new(&config.audio),
            work_dir: config.uploads_dir(),
            config,
            models,
            store,
        }
    }

    pub fn models(&self) -> &Arc<ModelManager> {
        &self.models
    }

    /// Runs the whole conversion for one upload.
    ///
    /// Invalid requests are rejected before anything touches the disk.
    pub async fn convert(&self, request: UploadRequest) -> AppResult<ArtifactReference> {
        let extension = request.validate()?;
        let mut job = PipelineJob::new(&self.work_dir, &extension, self.postprocessor.format());
        info!(
            "Job {}: '{}' ({} bytes), {} chars of text",
            job.id,
            request.filename,
            request.audio.len(),
            request.trimmed_text().chars().count()
        );

        let result = match self.models.ensure_ready().await {
            Ok(model) => match self.config.request_timeout() {
                // Ожидание модели в лимит не входит: первая загрузка может идти дольше
                Some(limit) => tokio::time::timeout(limit, self.run(&model, &mut job, &request))
                    .await
                    .unwrap_or(Err(AppError::Timeout(limit))),
                None => self.run(&model, &mut job, &request).await,
            },
            Err(e) => Err(e.at_stage(PipelineStage::ModelReady)),
        };

        self.remove_scratch(&job).await;

        match result {
            Ok(reference) => {
                job.set_status(JobStatus::Done);
                info!("Job {} done: {}", job.id, reference.name);
                Ok(reference)
            }
            Err(e) => {
                job.set_status(JobStatus::Failed);
                error!("Job {} failed: {}", job.id, e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        model: &ModelHandle,
        job: &mut PipelineJob,
        request: &UploadRequest,
    ) -> AppResult<ArtifactReference> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| AppError::from(e).at_stage(PipelineStage::Upload))?;
        tokio::fs::write(&job.raw_path, &request.audio)
            .await
            .map_err(|e| AppError::from(e).at_stage(PipelineStage::Upload))?;

        job.set_status(JobStatus::Normalizing);
        self.normalizer
            .normalize(&job.raw_path, &job.normalized_path)
            .await
            .map_err(|e| e.at_stage(PipelineStage::Normalize))?;

        job.set_status(JobStatus::Synthesizing);
        let text = format!("{}.", request.trimmed_text());
        model
            .synthesize(&text, &job.normalized_path, &job.synthesized_path)
            .await
            .map_err(|e| e.at_stage(PipelineStage::Synthesize))?;

        job.set_status(JobStatus::PostProcessing);
        let info = self
            .postprocessor
            .finalize(&job.synthesized_path, &job.output_path)
            .await
            .map_err(|e| e.at_stage(PipelineStage::PostProcess))?;

        let data = tokio::fs::read(&job.output_path)
            .await
            .map_err(|e| AppError::from(e).at_stage(PipelineStage::Register))?;
        let artifact = self
            .store
            .put(&job.output_name, data.into())
            .await
            .map_err(|e| e.at_stage(PipelineStage::Register))?;
        info!(
            "Job {}: {} ({} bytes, {} ms)",
            job.id,
            artifact.name,
            artifact.size_bytes,
            info.duration_ms()
        );

        Ok(ArtifactReference {
            url: self.config.audio_url(&artifact.name),
            name: artifact.name,
        })
    }

    /// Best effort: the delivered bytes already live in the store.
    async fn remove_scratch(&self, job: &PipelineJob) {
        for path in [&job.synthesized_path, &job.output_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}
