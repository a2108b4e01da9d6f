use crate::audio_store::{AudioStore, NewAudioRecord};
use crate::config::ApiConfig;
use crate::error::ApiError;
use anyhow::{anyhow, Context, Result};
use axum::extract::multipart::MultipartRejection;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Multipart field carrying the uploaded file
pub const AUDIO_FIELD: &str = "audioFile";

const DEFAULT_FILENAME: &str = "audio";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AudioStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn AudioStore>) -> Self {
        Self { store }
    }
}

/// Upload response
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFileResponse {
    pub id: String,
    pub filename: String,
    pub content_type: String,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/upload-audio", post(upload_audio))
        .route("/audio/:audio_id", get(get_audio))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "audio-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": format!("{e:#}")
            })),
        ),
    }
}

/// Store an uploaded audio file
#[instrument(skip(state, multipart))]
async fn upload_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AudioFileResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        ApiError::Upload(anyhow!("Invalid multipart request: {rejection}"))
    })?;

    let audio = read_audio_field(&mut multipart)
        .await
        .map_err(ApiError::Upload)?
        .ok_or(ApiError::MissingField(AUDIO_FIELD))?;

    let filename = audio.filename.clone();
    let content_type = audio.content_type.clone();
    let size_bytes = audio.data.len();

    let id = state.store.insert(audio).await.map_err(ApiError::Upload)?;

    metrics::counter!("audio.uploads").increment(1);
    metrics::counter!("audio.upload_bytes").increment(size_bytes as u64);

    info!(
        audio_id = %id,
        filename = %filename,
        content_type = %content_type,
        size_bytes = size_bytes,
        "Audio file uploaded"
    );

    Ok(Json(AudioFileResponse {
        id: id.to_string(),
        filename,
        content_type,
    }))
}

/// Stream a stored audio file back as an attachment
#[instrument(skip(state))]
async fn get_audio(
    State(state): State<AppState>,
    Path(audio_id): Path<String>,
) -> Result<Response, ApiError> {
    // A malformed ID can never match a stored record
    let id = Uuid::parse_str(&audio_id).map_err(|_| ApiError::NotFound)?;

    let audio = state
        .store
        .get(id)
        .await
        .map_err(ApiError::Retrieval)?
        .ok_or(ApiError::NotFound)?;

    debug!(
        audio_id = %audio.id,
        size_bytes = audio.data.len(),
        "Streaming audio file"
    );

    metrics::counter!("audio.downloads").increment(1);

    let content_type = HeaderValue::from_str(&audio.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let content_length = HeaderValue::from(audio.data.len());
    let disposition = content_disposition(&audio.filename);
    let body = Body::from_stream(ReaderStream::new(Cursor::new(audio.data)));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, content_length),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Read the `audioFile` part fully into memory, ignoring any other parts
async fn read_audio_field(multipart: &mut Multipart) -> Result<Option<NewAudioRecord>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .context("Failed to parse multipart data")?
    {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or(DEFAULT_FILENAME).to_string();
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let data = field
            .bytes()
            .await
            .context("Failed to read audio file")?;

        return Ok(Some(NewAudioRecord {
            filename,
            content_type,
            data: data.to_vec(),
        }));
    }

    Ok(None)
}

/// Build an `attachment` disposition carrying the stored filename
fn content_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Start the audio API server, returning once `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting audio API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
