//! Process-wide voice model: provisioned and loaded on first use, shared afterwards.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{OnceCell, Semaphore};

use super::bundle::{BundleLayout, ModelBundle};
use super::provisioner::ModelProvisioner;
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::services::tts::{SynthesisEngine, SynthesisRequest};

/// Turns an installed bundle into a runnable engine
#[async_trait::async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, bundle: &ModelBundle) -> AppResult<Arc<dyn SynthesisEngine>>;
}

/// The loaded model, shared by all requests
pub struct ModelHandle {
    bundle: ModelBundle,
    engine: Arc<dyn SynthesisEngine>,
    language: String,
    permits: Semaphore,
}

impl ModelHandle {
    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Runs one synthesis. Calls beyond the configured concurrency wait their turn.
    pub async fn synthesize(&self, text: &str, speaker_wav: &Path, output_path: &Path) -> AppResult<()> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AppError::Synthesis(format!("synthesis queue closed: {}", e)))?;

        let request = SynthesisRequest {
            text: text.to_string(),
            speaker_wav: speaker_wav.to_path_buf(),
            language: self.language.clone(),
            output_path: output_path.to_path_buf(),
        };
        self.engine.synthesize(&request).await
    }
}

pub struct ModelManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    provisioner: ModelProvisioner,
    loader: Arc<dyn ModelLoader>,
    language: String,
    max_concurrent: usize,
    handle: OnceCell<Arc<ModelHandle>>,
    loads: AtomicUsize,
}

impl ModelManager {
    pub fn new(config: &AppConfig, loader: Arc<dyn ModelLoader>) -> AppResult<Self> {
        Ok(Self {
            inner: Arc::new(ManagerInner {
                provisioner: ModelProvisioner::new(config)?,
                loader,
                language: config.model.language.clone(),
                max_concurrent: config.model.max_concurrent_synthesis.max(1),
                handle: OnceCell::new(),
                loads: AtomicUsize::new(0),
            }),
        })
    }

    /// Returns the shared model, provisioning and loading it on the first call.
    ///
    /// Concurrent first callers wait for the same initialization. A failed
    /// initialization is not cached: the next call tries again.
    ///
    /// Initialization runs on its own task, so a caller that gives up
    /// (timeout, client disconnect) does not abort a download in progress.
    pub async fn ensure_ready(&self) -> AppResult<Arc<ModelHandle>> {
        if let Some(handle) = self.inner.handle.get() {
            return Ok(handle.clone());
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner
                .handle
                .get_or_try_init(|| inner.initialize())
                .await
                .cloned()
        })
        .await?
    }

    pub fn is_ready(&self) -> bool {
        self.inner.handle.initialized()
    }

    /// Number of successful loads since start (at most one)
    pub fn model_loads(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }

    pub fn model_dir(&self) -> &Path {
        self.inner.provisioner.model_dir()
    }
}

impl ManagerInner {
    async fn initialize(&self) -> AppResult<Arc<ModelHandle>> {
        info!("Initializing voice model (language {})", self.language);

        let dir: PathBuf = self.provisioner.ensure().await?;
        let layout: BundleLayout = self.provisioner.layout().clone();
        let bundle = tokio::task::spawn_blocking(move || ModelBundle::open(&dir, &layout)).await??;

        if !bundle.supports_language(&self.language) {
            return Err(AppError::ModelLoad(format!(
                "model does not support language '{}' (available: {})",
                self.language,
                bundle.languages().join(", ")
            )));
        }

        let engine = self.loader.load(&bundle).await?;
        let loads = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Model load #{}", loads);
        info!("Voice model ready: {}", bundle.dir().display());

        Ok(Arc::new(ModelHandle {
            bundle,
            engine,
            language: self.language.clone(),
            permits: Semaphore::new(self.max_concurrent),
        }))
    }
}
