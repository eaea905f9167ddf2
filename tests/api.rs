mod common;

use std::time::Duration;

use axum::body::{to_bytes, Bytes};
use axum::http::{header, StatusCode};
use axum::response::Response;
use serde_json::Value;
use tower::ServiceExt;

use common::{
    clone_request, get_request, wav_bytes, write_corrupt_archive, write_model_archive, TestApp,
    SYNTH_FRAMES, SYNTH_RATE,
};
use vocarise::services::audio::format::decode_audio_file;

async fn body_bytes(response: Response) -> Bytes {
    to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Отправляет образец и возвращает имя артефакта из audio_url
async fn clone_ok(app: &TestApp, filename: &str, audio: &[u8], text: &str) -> String {
    let response = app
        .router
        .clone()
        .oneshot(clone_request(Some((filename, audio)), Some(text)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK, "upload of {}", filename);

    let json = body_json(response).await;
    assert_eq!(json["success"], Value::Bool(true));
    let url = json["audio_url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/api/audio/"), "{}", url);
    url.trim_start_matches("/api/audio/").to_string()
}

#[tokio::test]
async fn allowed_extensions_in_any_case_are_served_back() {
    let app = TestApp::new().await;
    let sample = wav_bytes(1.0, 16000, 1);

    for filename in ["voice.wav", "VOICE.WAV", "voice.Mp3", "voice.M4A"] {
        let name = clone_ok(&app, filename, &sample, "Bonjour").await;

        let response = app
            .router
            .clone()
            .oneshot(get_request(&format!("/api/audio/{}", name)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");

        let served = body_bytes(response).await;
        let on_disk = std::fs::read(app.config.outputs_dir().join(&name)).unwrap();
        assert_eq!(served.as_ref(), on_disk.as_slice());
    }
    assert_eq!(app.loads(), 1);
}

#[tokio::test]
async fn disallowed_extension_is_rejected_without_writing() {
    let app = TestApp::new().await;
    let sample = wav_bytes(1.0, 16000, 1);

    for filename in ["voice.ogg", "voice.flac", "voice", "voice.wav.txt"] {
        let response = app
            .router
            .clone()
            .oneshot(clone_request(Some((filename, sample.as_slice())), Some("Bonjour")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", filename);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("not allowed"));
    }

    assert!(app.stored_files().is_empty(), "{:?}", app.stored_files());
    assert_eq!(app.loads(), 0);
}

#[tokio::test]
async fn missing_fields_and_blank_text_are_bad_requests() {
    let app = TestApp::new().await;
    let sample = wav_bytes(0.5, 16000, 1);

    let cases = [
        clone_request(None, Some("Bonjour")),
        clone_request(Some(("voice.wav", sample.as_slice())), None),
        clone_request(Some(("voice.wav", sample.as_slice())), Some("  \t ")),
        clone_request(Some(("voice.wav", &[0u8; 0][..])), Some("Bonjour")),
    ];
    for request in cases {
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }
    assert!(app.stored_files().is_empty());
}

#[tokio::test]
async fn unknown_and_traversal_names_are_not_found() {
    let app = TestApp::new().await;
    std::fs::write(app.config.storage_root.join("secret.txt"), b"top secret").unwrap();

    for uri in [
        "/api/audio/voice_clone_missing.mp3",
        "/api/audio/..%2Fsecret.txt",
        "/api/audio/..",
    ] {
        let response = app.router.clone().oneshot(get_request(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        assert!(body_json(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn concurrent_first_requests_load_the_model_once() {
    let app = TestApp::new().await;
    let sample = wav_bytes(0.5, 16000, 1);

    let requests = (0..6).map(|i| {
        let router = app.router.clone();
        let text = format!("Phrase {}", i);
        let request = clone_request(Some(("voice.wav", sample.as_slice())), Some(text.as_str()));
        async move { router.oneshot(request).await.unwrap() }
    });
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(app.loads(), 1);

    let health = body_json(app.router.clone().oneshot(get_request("/api/health")).await.unwrap()).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["model_ready"], Value::Bool(true));
    assert_eq!(health["model_loads"], 1);
}

#[tokio::test]
async fn corrupt_download_leaves_no_model_and_next_request_recovers() {
    let app = TestApp::with_archive(write_corrupt_archive).await;
    let sample = wav_bytes(0.5, 16000, 1);

    let response = app
        .router
        .clone()
        .oneshot(clone_request(Some(("voice.wav", sample.as_slice())), Some("Bonjour")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"].as_str().unwrap().contains("model-ready"));
    assert!(!app.config.model_dir().exists());

    let health = body_json(app.router.clone().oneshot(get_request("/api/health")).await.unwrap()).await;
    assert_eq!(health["model_ready"], Value::Bool(false));

    // Источник исправлен: следующий запрос устанавливает модель заново
    write_model_archive(&app.archive);
    clone_ok(&app, "voice.wav", &sample, "Bonjour").await;
    assert!(app.config.model_dir().join("model_file.pth").exists());
    assert_eq!(app.loads(), 1);
}

#[tokio::test]
async fn unreadable_audio_is_a_server_error() {
    let app = TestApp::new().await;
    let response = app
        .router
        .clone()
        .oneshot(clone_request(Some(("voice.mp3", &[0x13u8; 1024][..])), Some("Bonjour")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"]
        .as_str()
        .unwrap()
        .contains("Unsupported audio format"));
    assert!(app.engine.texts.lock().unwrap().is_empty());
    assert!(std::fs::read_dir(app.config.outputs_dir()).unwrap().next().is_none());
}

#[tokio::test]
async fn bonjour_end_to_end_adds_one_second_of_silence() {
    let app = TestApp::new().await;
    let name = clone_ok(&app, "reference.wav", &wav_bytes(5.0, 16000, 1), "Bonjour").await;
    assert_eq!(*app.engine.texts.lock().unwrap(), vec!["Bonjour.".to_string()]);

    let response = app
        .router
        .clone()
        .oneshot(get_request(&format!("/api/audio/{}", name)))
        .await
        .unwrap();
    let bytes = body_bytes(response).await;

    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join(&name);
    std::fs::write(&path, &bytes).unwrap();
    let decoded = decode_audio_file(&path).unwrap();

    assert_eq!(decoded.sample_rate, SYNTH_RATE);
    assert_eq!(decoded.frames(), SYNTH_FRAMES + SYNTH_RATE as usize);
    assert!(decoded.info().duration_ms() >= 500 + 1000);
}

#[tokio::test]
async fn landing_page_and_health() {
    let app = TestApp::new().await;

    let response = app.router.clone().oneshot(get_request("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(String::from_utf8_lossy(&body_bytes(response).await).contains("Vocarise"));

    let health = body_json(app.router.clone().oneshot(get_request("/api/health")).await.unwrap()).await;
    assert_eq!(health["model_ready"], Value::Bool(false));
    assert_eq!(health["model_loads"], 0);

    std::fs::remove_file(app.config.frontend_dir.join("index.html")).unwrap();
    let response = app.router.clone().oneshot(get_request("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn slow_first_model_load_outlasting_the_request_timeout_still_succeeds() {
    let app = TestApp::with_options(Duration::from_millis(1500), |config| {
        config.request_timeout_secs = 1;
    })
    .await;
    let sample = wav_bytes(0.5, 16000, 1);

    for i in 0..3 {
        let text = format!("Phrase {}", i);
        clone_ok(&app, "voice.wav", &sample, &text).await;
    }
    assert_eq!(app.loads(), 1);

    let health = body_json(app.router.clone().oneshot(get_request("/api/health")).await.unwrap()).await;
    assert_eq!(health["model_ready"], Value::Bool(true));
}

#[tokio::test]
async fn oversized_upload_is_payload_too_large() {
    let app = TestApp::with_options(Duration::from_millis(10), |config| {
        config.max_upload_bytes = 4096;
    })
    .await;
    let sample = wav_bytes(2.0, 16000, 1);
    assert!(sample.len() > 4096);

    let response = app
        .router
        .clone()
        .oneshot(clone_request(Some(("voice.wav", sample.as_slice())), Some("Bonjour")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body_json(response).await["error"]
        .as_str()
        .unwrap()
        .contains("4096"));
    assert!(app.stored_files().is_empty());
    assert_eq!(app.loads(), 0);
}
