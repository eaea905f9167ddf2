//! Extracted voice model on disk: config, weights and supported languages.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::config::ModelConfig;
use crate::errors::{AppError, AppResult};
use crate::utils::common::file_exists_and_valid;

/// Language table shipped next to multilingual checkpoints
const LANGUAGE_IDS_FILE: &str = "language_ids.json";

/// Side files a checkpoint config refers to, and the config keys holding their paths.
/// The first candidate present in the bundle wins.
const LINKED_FILES: &[(&[&str], &[&str])] = &[
    (&["scale_stats.npy"], &["audio.stats_path"]),
    (
        &["speakers.json", "speakers.pth"],
        &["d_vector_file", "model_args.d_vector_file"],
    ),
    (
        &["speaker_ids.json", "speaker_ids.pth"],
        &["speakers_file", "model_args.speakers_file"],
    ),
    (
        &[LANGUAGE_IDS_FILE],
        &["language_ids_file", "model_args.language_ids_file"],
    ),
    (
        &["model_se.pth", "model_se.pth.tar"],
        &["speaker_encoder_model_path", "model_args.speaker_encoder_model_path"],
    ),
    (
        &["config_se.json"],
        &["speaker_encoder_config_path", "model_args.speaker_encoder_config_path"],
    ),
];

/// File names a complete bundle directory must contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    pub config_file: String,
    pub weights_file: String,
}

impl Default for BundleLayout {
    fn default() -> Self {
        Self {
            config_file: "config.json".to_string(),
            weights_file: "model_file.pth".to_string(),
        }
    }
}

impl BundleLayout {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            config_file: config.config_file.clone(),
            weights_file: config.weights_file.clone(),
        }
    }

    /// Both files present and non-empty
    pub fn is_complete(&self, dir: &Path) -> bool {
        file_exists_and_valid(&dir.join(&self.config_file))
            && file_exists_and_valid(&dir.join(&self.weights_file))
    }

    /// Shallowest directory under `search_root` (inclusive) holding a complete bundle.
    /// Archives are often packed with an extra top-level folder.
    pub fn locate_root(&self, search_root: &Path) -> Option<PathBuf> {
        WalkDir::new(search_root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir() && self.is_complete(entry.path()))
            .min_by_key(|entry| entry.depth())
            .map(|entry| entry.into_path())
    }
}

/// The parts of the model config this service reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelDescriptor {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub languages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ModelBundle {
    dir: PathBuf,
    config_path: PathBuf,
    weights_path: PathBuf,
    descriptor: ModelDescriptor,
    languages: Vec<String>,
}

impl ModelBundle {
    /// Reads and checks a bundle directory. Missing or unreadable parts are `ModelLoad` errors.
    pub fn open(dir: &Path, layout: &BundleLayout) -> AppResult<Self> {
        let config_path = dir.join(&layout.config_file);
        let weights_path = dir.join(&layout.weights_file);

        if !file_exists_and_valid(&weights_path) {
            return Err(AppError::ModelLoad(format!(
                "weights file missing or empty: {}",
                weights_path.display()
            )));
        }

        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            AppError::ModelLoad(format!("cannot read {}: {}", config_path.display(), e))
        })?;
        let descriptor: ModelDescriptor = serde_json::from_str(&raw).map_err(|e| {
            AppError::ModelLoad(format!("invalid model config {}: {}", config_path.display(), e))
        })?;

        let languages = if descriptor.languages.is_empty() {
            read_language_ids(&dir.join(LANGUAGE_IDS_FILE))?
        } else {
            descriptor.languages.clone()
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            config_path,
            weights_path,
            descriptor,
            languages,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn weights_path(&self) -> &Path {
        &self.weights_path
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Bundles that do not declare languages accept any code.
    pub fn supports_language(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }
}

/// Points the side-file keys of `config_file` at `install_dir`.
///
/// Released checkpoints carry the paths of the machine they were trained on,
/// and the CLI engine reads the config as is. Only keys already present in
/// the config are touched. Returns the number of keys rewritten.
pub fn rebase_linked_paths(bundle_dir: &Path, install_dir: &Path, config_file: &str) -> AppResult<usize> {
    let config_path = bundle_dir.join(config_file);
    let raw = std::fs::read_to_string(&config_path)?;
    let mut config: Value = serde_json::from_str(&raw)?;

    let mut rewritten = 0;
    for (candidates, keys) in LINKED_FILES {
        let Some(file) = candidates.iter().find(|f| bundle_dir.join(f).is_file()) else {
            continue;
        };
        let target = Value::String(install_dir.join(file).to_string_lossy().into_owned());

        for key in keys.iter() {
            if let Some(slot) = lookup_mut(&mut config, key) {
                // Списки путей заменяются списком из одного элемента
                let is_list = slot.is_array();
                *slot = if is_list {
                    Value::Array(vec![target.clone()])
                } else {
                    target.clone()
                };
                rewritten += 1;
            }
        }
    }

    if rewritten > 0 {
        std::fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;
    }
    Ok(rewritten)
}

fn lookup_mut<'a>(config: &'a mut Value, dotted: &str) -> Option<&'a mut Value> {
    dotted
        .split('.')
        .try_fold(config, |node, key| node.as_object_mut()?.get_mut(key))
}

fn read_language_ids(path: &Path) -> AppResult<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::ModelLoad(format!("cannot read {}: {}", path.display(), e)))?;
    let ids: HashMap<String, Value> = serde_json::from_str(&raw)
        .map_err(|e| AppError::ModelLoad(format!("invalid {}: {}", path.display(), e)))?;

    let mut languages: Vec<String> = ids.into_keys().collect();
    languages.sort();
    Ok(languages)
}
