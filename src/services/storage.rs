//! Storage for finished audio files, addressed by flat file name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use log::{debug, info};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{Artifact, SpeechFormat};
use crate::utils::common::is_safe_file_name;

/// Trait that artifact backends must implement
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores `data` under `name`. Once this returns, `get(name)` yields the same bytes.
    async fn put(&self, name: &str, data: Bytes) -> AppResult<Artifact>;

    /// Unknown and malformed names are `NotFound`.
    async fn get(&self, name: &str) -> AppResult<Bytes>;
}

/// MIME type by file extension
pub fn content_type_for(name: &str) -> &'static str {
    name.rsplit_once('.')
        .and_then(|(_, ext)| SpeechFormat::from_extension(ext))
        .map(|format| format.content_type())
        .unwrap_or("application/octet-stream")
}

fn format_of(name: &str) -> Option<SpeechFormat> {
    name.rsplit_once('.')
        .and_then(|(_, ext)| SpeechFormat::from_extension(ext))
}

fn check_name_for_put(name: &str) -> AppResult<()> {
    if is_safe_file_name(name) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!("invalid artifact name: {}", name)))
    }
}

/// Files in one directory on local disk
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, name: &str, data: Bytes) -> AppResult<Artifact> {
        check_name_for_put(name)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.root.join(name);
        // Файл появляется под своим именем только целиком
        let partial = self.root.join(format!(".{}.{}.part", name, Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&partial, &data).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        info!("Stored {} ({} bytes)", path.display(), data.len());
        Ok(Artifact {
            name: name.to_string(),
            path: Some(path),
            format: format_of(name),
            size_bytes: data.len() as u64,
            created_at: Utc::now(),
        })
    }

    async fn get(&self, name: &str) -> AppResult<Bytes> {
        if !is_safe_file_name(name) {
            debug!("Rejected artifact name {:?}", name);
            return Err(AppError::NotFound(name.to_string()));
        }

        match tokio::fs::read(self.root.join(name)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory backend, mostly for tests
#[derive(Default)]
pub struct MemoryArtifactStore {
    items: RwLock<HashMap<String, Bytes>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, name: &str, data: Bytes) -> AppResult<Artifact> {
        check_name_for_put(name)?;
        let size_bytes = data.len() as u64;
        self.items.write().await.insert(name.to_string(), data);
        Ok(Artifact {
            name: name.to_string(),
            path: None,
            format: format_of(name),
            size_bytes,
            created_at: Utc::now(),
        })
    }

    async fn get(&self, name: &str) -> AppResult<Bytes> {
        self.items
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(name.to_string()))
    }
}
