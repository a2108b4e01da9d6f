//! Audio Service
//!
//! Upload and playback storage for recorded meeting audio. Clients post an
//! audio file as multipart form data, the service stores it in PostgreSQL and
//! hands back an ID, and the same file can later be streamed back by that ID.
//!
//! ## Endpoints
//!
//! - `POST /upload-audio`: multipart field `audioFile`, responds with
//!   `{id, filename, content_type}`
//! - `GET /audio/{audio_id}`: the stored bytes as an attachment with the
//!   original content type and filename
//! - `GET /health`, `GET /ready`: liveness and database readiness
//!
//! ## Architecture
//!
//! ```text
//!  Browser recorder            Audio API                 PostgreSQL
//! ┌──────────────┐          ┌──────────────┐          ┌──────────────┐
//! │ multipart    │─────────▶│ upload_audio │─────────▶│ audio_files  │
//! │ POST         │          └──────────────┘          │              │
//! └──────────────┘          ┌──────────────┐          │              │
//! ┌──────────────┐◀─────────│ get_audio    │◀─────────│              │
//! │ playback     │          └──────────────┘          └──────────────┘
//! └──────────────┘
//! ```

pub mod api;
pub mod audio_store;
pub mod config;
pub mod error;

pub use api::{create_router, AppState, AudioFileResponse};
pub use audio_store::{AudioRecord, AudioStore, NewAudioRecord, PgAudioStore};
pub use config::Config;
pub use error::{ApiError, ErrorResponse};
