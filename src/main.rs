use std::sync::Arc;

use log::{error, info, warn};

use vocarise::config::AppConfig;
use vocarise::models::SpeechFormat;
use vocarise::server::{self, AppState};
use vocarise::services::audio::ffmpeg;
use vocarise::services::model::ModelManager;
use vocarise::services::storage::LocalArtifactStore;
use vocarise::services::tts::CoquiLoader;
use vocarise::utils::logger::init_logger;

#[tokio::main]
async fn main() {
    init_logger();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Arc::new(AppConfig::load()?);
    config.prepare_dirs().await?;

    // Внешние программы нужны только при первом запросе, поэтому лишь предупреждаем
    if which::which(&config.model.engine_program).is_err() {
        warn!(
            "Synthesis runtime '{}' not found in PATH, requests will fail until it is installed",
            config.model.engine_program
        );
    }
    if config.audio.delivery_format == SpeechFormat::Mp3
        && ffmpeg::locate(&config.audio.ffmpeg_program).is_none()
    {
        warn!(
            "'{}' not found in PATH, MP3 encoding will fail",
            config.audio.ffmpeg_program
        );
    }

    let loader = Arc::new(CoquiLoader::new(
        config.model.engine_program.clone(),
        config.model.use_cuda,
    ));
    let models = Arc::new(ModelManager::new(&config, loader)?);
    let store = Arc::new(LocalArtifactStore::new(config.outputs_dir()));
    let app = server::router(AppState::new(config.clone(), models, store));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Listening on http://{} (storage: {}, model: {})",
        addr,
        config.storage_root.display(),
        config.model_dir().display()
    );

    axum::serve(listener, app).await?;
    Ok(())
}
