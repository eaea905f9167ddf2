//! Downloads and unpacks the voice model archive into the models directory.
//!
//! The archive is fetched and extracted inside a staging directory next to
//! the final location, then moved into place with a single rename. A crash
//! or a failed download therefore never leaves a directory that looks installed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;

use super::bundle::{rebase_linked_paths, BundleLayout};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

/// Where the model archive comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    Http(String),
    Local(PathBuf),
}

impl ArchiveSource {
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if source.starts_with("http://") || source.starts_with("https://") {
            ArchiveSource::Http(source.to_string())
        } else if let Some(path) = source.strip_prefix("file://") {
            ArchiveSource::Local(PathBuf::from(path))
        } else {
            ArchiveSource::Local(PathBuf::from(source))
        }
    }
}

pub struct ModelProvisioner {
    source: ArchiveSource,
    models_dir: PathBuf,
    model_dir: PathBuf,
    layout: BundleLayout,
    client: reqwest::Client,
}

impl ModelProvisioner {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.model.download_timeout_secs))
            .build()?;

        Ok(Self {
            source: ArchiveSource::parse(&config.model.source_url),
            models_dir: config.models_dir(),
            model_dir: config.model_dir(),
            layout: BundleLayout::from_config(&config.model),
            client,
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    pub fn is_installed(&self) -> bool {
        self.layout.is_complete(&self.model_dir)
    }

    /// Makes sure a complete bundle exists at the model directory and returns it.
    ///
    /// Every failure is reported as `ModelProvision`; the model directory is
    /// then absent, so the next call starts over.
    pub async fn ensure(&self) -> AppResult<PathBuf> {
        if self.is_installed() {
            return Ok(self.model_dir.clone());
        }

        self.provision().await.map_err(|e| match e {
            AppError::ModelProvision(_) => e,
            other => AppError::ModelProvision(other.to_string()),
        })?;
        Ok(self.model_dir.clone())
    }

    async fn provision(&self) -> AppResult<()> {
        if self.model_dir.exists() {
            warn!(
                "Incomplete model directory {}, reinstalling",
                self.model_dir.display()
            );
            tokio::fs::remove_dir_all(&self.model_dir).await?;
        }
        tokio::fs::create_dir_all(&self.models_dir).await?;

        // Удаляется автоматически при выходе из функции
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.models_dir)?;
        let archive_path = staging.path().join("bundle.zip");
        let extract_dir = staging.path().join("bundle");

        let size = self.fetch(&archive_path).await?;
        info!("Model archive ready ({} bytes), extracting", size);

        let layout = self.layout.clone();
        let install_dir = self.model_dir.clone();
        let root = tokio::task::spawn_blocking(move || {
            extract_archive(&archive_path, &extract_dir)?;
            let root = layout.locate_root(&extract_dir).ok_or_else(|| {
                AppError::ModelProvision(format!(
                    "archive does not contain {} and {}",
                    layout.config_file, layout.weights_file
                ))
            })?;
            // Пути в конфиге должны указывать на итоговый каталог, а не на staging
            let rebased = rebase_linked_paths(&root, &install_dir, &layout.config_file)?;
            debug!("Rebased {} config paths onto {}", rebased, install_dir.display());
            Ok::<_, AppError>(root)
        })
        .await??;

        tokio::fs::rename(&root, &self.model_dir).await?;
        info!("Model installed at {}", self.model_dir.display());
        Ok(())
    }

    async fn fetch(&self, destination: &Path) -> AppResult<u64> {
        match &self.source {
            ArchiveSource::Http(url) => self.download(url, destination).await,
            ArchiveSource::Local(path) => {
                info!("Copying model archive from {}", path.display());
                tokio::fs::copy(path, destination).await.map_err(|e| {
                    AppError::ModelProvision(format!("cannot read {}: {}", path.display(), e))
                })
            }
        }
    }

    async fn download(&self, url: &str, destination: &Path) -> AppResult<u64> {
        info!("Downloading model from {}", url);

        let response = self.client.get(url).send().await?.error_for_status()?;
        let total = response.content_length();

        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_reported = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total.filter(|t| *t > 0) {
                let percent = downloaded * 100 / total;
                if percent >= last_reported + 10 {
                    last_reported = percent - percent % 10;
                    info!("Model download: {}% ({} / {} bytes)", percent, downloaded, total);
                }
            }
        }
        file.flush().await?;

        if let Some(total) = total {
            if downloaded != total {
                return Err(AppError::ModelProvision(format!(
                    "download truncated: {} of {} bytes",
                    downloaded, total
                )));
            }
        }

        Ok(downloaded)
    }
}

fn extract_archive(archive_path: &Path, target_dir: &Path) -> AppResult<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    std::fs::create_dir_all(target_dir)?;
    archive.extract(target_dir)?;
    Ok(())
}
