use anyhow::{anyhow, Result};
use async_trait::async_trait;
use audio_service::api::{create_router, AppState, AudioFileResponse};
use audio_service::audio_store::{AudioRecord, AudioStore, NewAudioRecord};
use audio_service::config::ApiConfig;
use audio_service::error::ErrorResponse;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "audio-test-boundary";

#[derive(Default)]
struct InMemoryAudioStore {
    records: Mutex<HashMap<Uuid, AudioRecord>>,
}

#[async_trait]
impl AudioStore for InMemoryAudioStore {
    async fn insert(&self, audio: NewAudioRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let record = AudioRecord {
            id,
            filename: audio.filename,
            content_type: audio.content_type,
            data: audio.data,
            created_at: Utc::now(),
        };
        self.records.lock().unwrap().insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AudioRecord>> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

struct UnavailableStore;

#[async_trait]
impl AudioStore for UnavailableStore {
    async fn insert(&self, _audio: NewAudioRecord) -> Result<Uuid> {
        Err(anyhow!("database unavailable"))
    }

    async fn get(&self, _id: Uuid) -> Result<Option<AudioRecord>> {
        Err(anyhow!("database unavailable"))
    }

    async fn ping(&self) -> Result<()> {
        Err(anyhow!("database unavailable"))
    }
}

fn app(store: Arc<dyn AudioStore>) -> Router {
    app_with_config(store, &ApiConfig::default())
}

fn app_with_config(store: Arc<dyn AudioStore>, config: &ApiConfig) -> Router {
    create_router(AppState::new(store), config)
}

fn multipart_part(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    part.extend_from_slice(data);
    part.extend_from_slice(b"\r\n");
    part
}

fn upload_request(parts: Vec<Vec<u8>>) -> Request<Body> {
    let mut body = parts.concat();
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/upload-audio")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn upload(app: &Router, filename: &str, content_type: &str, data: &[u8]) -> AudioFileResponse {
    let response = send(
        app,
        upload_request(vec![multipart_part("audioFile", filename, content_type, data)]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn download(app: &Router, id: &str) -> Response {
    send(
        app,
        Request::get(format!("/audio/{id}")).body(Body::empty()).unwrap(),
    )
    .await
}

async fn error_detail(response: Response) -> String {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    error.detail
}

#[tokio::test]
async fn upload_then_download_round_trips() {
    let app = app(Arc::new(InMemoryAudioStore::default()));
    let data: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();

    let uploaded = upload(&app, "recording.webm", "audio/webm", &data).await;
    assert_eq!(uploaded.filename, "recording.webm");
    assert_eq!(uploaded.content_type, "audio/webm");
    assert!(Uuid::parse_str(&uploaded.id).is_ok());

    let response = download(&app, &uploaded.id).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/webm");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"recording.webm\""
    );
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "65536");

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.as_ref(), data.as_slice());
}

#[tokio::test]
async fn empty_upload_round_trips_as_zero_length() {
    let app = app(Arc::new(InMemoryAudioStore::default()));

    let uploaded = upload(&app, "silence.wav", "audio/wav", b"").await;

    let response = download(&app, &uploaded.id).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let app = app(Arc::new(InMemoryAudioStore::default()));

    let response = download(&app, &Uuid::new_v4().to_string()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_detail(response).await, "Audio file not found");
}

#[tokio::test]
async fn malformed_id_is_not_found() {
    let app = app(Arc::new(InMemoryAudioStore::default()));

    let response = download(&app, "507f1f77bcf86cd799439011").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_fields_are_ignored() {
    let store = Arc::new(InMemoryAudioStore::default());
    let app = app(store.clone());

    let response = send(
        &app,
        upload_request(vec![
            multipart_part("note", "note.txt", "text/plain", b"standup"),
            multipart_part("audioFile", "standup.ogg", "audio/ogg", b"OggS"),
        ]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let records = store.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    let record = records.values().next().unwrap();
    assert_eq!(record.filename, "standup.ogg");
    assert_eq!(record.data, b"OggS");
}

#[tokio::test]
async fn missing_audio_field_is_rejected() {
    let app = app(Arc::new(InMemoryAudioStore::default()));

    let response = send(
        &app,
        upload_request(vec![multipart_part("file", "a.mp3", "audio/mpeg", b"ID3")]),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        error_detail(response).await,
        "Missing required field: 'audioFile'"
    );
}

#[tokio::test]
async fn storage_failure_on_upload_is_server_error() {
    let app = app(Arc::new(UnavailableStore));

    let response = send(
        &app,
        upload_request(vec![multipart_part("audioFile", "a.mp3", "audio/mpeg", b"ID3")]),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        error_detail(response).await,
        "Error uploading audio file: database unavailable"
    );
}

#[tokio::test]
async fn storage_failure_on_download_is_server_error() {
    let app = app(Arc::new(UnavailableStore));

    let response = download(&app, &Uuid::new_v4().to_string()).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_detail(response)
        .await
        .starts_with("Error retrieving audio file:"));
}

#[tokio::test]
async fn health_and_readiness() {
    let app = app(Arc::new(InMemoryAudioStore::default()));

    let health = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(health.status(), StatusCode::OK);

    let ready = send(&app, Request::get("/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(ready.status(), StatusCode::OK);
}

#[tokio::test]
async fn non_multipart_upload_is_json_server_error() {
    let app = app(Arc::new(InMemoryAudioStore::default()));

    let response = send(
        &app,
        Request::post("/upload-audio")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"audioFile":"recording.webm"}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert!(error_detail(response)
        .await
        .starts_with("Error uploading audio file: Invalid multipart request"));
}

#[tokio::test]
async fn upload_over_size_limit_is_server_error() {
    let store = Arc::new(InMemoryAudioStore::default());
    let config = ApiConfig {
        max_upload_bytes: 1024,
        ..ApiConfig::default()
    };
    let app = app_with_config(store.clone(), &config);

    let response = send(
        &app,
        upload_request(vec![multipart_part(
            "audioFile",
            "long.webm",
            "audio/webm",
            &[7u8; 4096],
        )]),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_detail(response)
        .await
        .starts_with("Error uploading audio file:"));
    assert!(store.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn configured_cors_origins_are_enforced() {
    let config = ApiConfig {
        cors_origins: vec!["http://localhost:3000".to_string()],
        ..ApiConfig::default()
    };
    let app = app_with_config(Arc::new(InMemoryAudioStore::default()), &config);

    let allowed = send(
        &app,
        Request::get("/health")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(
        allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );

    let other = send(
        &app,
        Request::get("/health")
            .header(header::ORIGIN, "http://elsewhere.example")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(other.status(), StatusCode::OK);
    assert!(other
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
