// Shared fixtures for the HTTP tests: a fake engine, model archives and request builders

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use vocarise::config::AppConfig;
use vocarise::errors::AppResult;
use vocarise::models::SpeechFormat;
use vocarise::server::{self, AppState};
use vocarise::services::audio::format::encode_wav_pcm16;
use vocarise::services::model::{ModelBundle, ModelLoader, ModelManager};
use vocarise::services::storage::LocalArtifactStore;
use vocarise::services::tts::{SynthesisEngine, SynthesisRequest};

pub const BOUNDARY: &str = "vocarise-test-boundary";
pub const SYNTH_RATE: u32 = 22050;
pub const SYNTH_FRAMES: usize = 11025;

/// Speaks half a second of tone for any text
#[derive(Default)]
pub struct FakeEngine {
    pub texts: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl SynthesisEngine for FakeEngine {
    async fn synthesize(&self, request: &SynthesisRequest) -> AppResult<()> {
        self.texts.lock().unwrap().push(request.text.clone());
        let tone: Vec<f32> = (0..SYNTH_FRAMES)
            .map(|i| (i as f32 * 0.07).sin() * 0.3)
            .collect();
        encode_wav_pcm16(&tone, 1, SYNTH_RATE, &request.output_path)?;
        Ok(())
    }
}

/// Counts loads; the delay makes concurrent first requests overlap
pub struct CountingLoader {
    pub engine: Arc<FakeEngine>,
    pub loads: AtomicUsize,
    pub delay: Duration,
}

#[async_trait::async_trait]
impl ModelLoader for CountingLoader {
    async fn load(&self, _bundle: &ModelBundle) -> AppResult<Arc<dyn SynthesisEngine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.engine.clone())
    }
}

pub struct TestApp {
    pub dir: TempDir,
    pub archive: PathBuf,
    pub config: Arc<AppConfig>,
    pub engine: Arc<FakeEngine>,
    pub loader: Arc<CountingLoader>,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_archive(|path| write_model_archive(path)).await
    }

    pub async fn with_archive(make_archive: impl FnOnce(&Path)) -> Self {
        Self::build(make_archive, Duration::from_millis(100), |_| {}).await
    }

    /// Same app with a custom loader delay and config overrides
    pub async fn with_options(loader_delay: Duration, configure: impl FnOnce(&mut AppConfig)) -> Self {
        Self::build(|path| write_model_archive(path), loader_delay, configure).await
    }

    async fn build(
        make_archive: impl FnOnce(&Path),
        loader_delay: Duration,
        configure: impl FnOnce(&mut AppConfig),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("your_tts.zip");
        make_archive(&archive);

        let frontend = dir.path().join("frontend");
        std::fs::create_dir_all(&frontend).unwrap();
        std::fs::write(frontend.join("index.html"), "<h1>Vocarise</h1>").unwrap();

        let mut config = AppConfig::default();
        config.storage_root = dir.path().join("data");
        config.frontend_dir = frontend;
        config.model.source_url = format!("file://{}", archive.display());
        config.audio.delivery_format = SpeechFormat::Wav;
        configure(&mut config);
        let config = Arc::new(config);
        config.prepare_dirs().await.unwrap();

        let engine = Arc::new(FakeEngine::default());
        let loader = Arc::new(CountingLoader {
            engine: engine.clone(),
            loads: AtomicUsize::new(0),
            delay: loader_delay,
        });
        let models = Arc::new(ModelManager::new(&config, loader.clone()).unwrap());
        let store = Arc::new(LocalArtifactStore::new(config.outputs_dir()));
        let router = server::router(AppState::new(config.clone(), models, store));

        Self {
            dir,
            archive,
            config,
            engine,
            loader,
            router,
        }
    }

    pub fn loads(&self) -> usize {
        self.loader.loads.load(Ordering::SeqCst)
    }

    /// Regular files anywhere under the storage root
    pub fn stored_files(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(&self.config.storage_root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }
}

pub fn write_model_archive(path: &Path) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, data) in [
        ("tts_models/config.json", br#"{"model": "vits"}"#.as_slice()),
        ("tts_models/model_file.pth", b"weights".as_slice()),
        ("tts_models/language_ids.json", br#"{"en": 0, "fr-fr": 1, "pt-br": 2}"#.as_slice()),
    ] {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

pub fn write_corrupt_archive(path: &Path) {
    std::fs::write(path, b"PK\x03\x04 this download was cut short").unwrap();
}

/// Mono or interleaved sine wave encoded as 16-bit WAV
pub fn wav_bytes(seconds: f32, sample_rate: u32, channels: u16) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.wav");
    let frames = (seconds * sample_rate as f32) as usize;
    let samples: Vec<f32> = (0..frames)
        .flat_map(|i| {
            let s = (2.0 * std::f32::consts::PI * 180.0 * i as f32 / sample_rate as f32).sin() * 0.4;
            std::iter::repeat(s).take(channels as usize)
        })
        .collect();
    encode_wav_pcm16(&samples, channels, sample_rate, &path).unwrap();
    std::fs::read(path).unwrap()
}

pub fn multipart_body(audio: Option<(&str, &[u8])>, text: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((filename, data)) = audio {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(text) = text {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"text\"\r\n\r\n{text}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn clone_request(audio: Option<(&str, &[u8])>, text: Option<&str>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/clone-voice")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(audio, text)))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}
