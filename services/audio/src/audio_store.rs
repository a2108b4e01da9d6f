use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Stored audio file
#[derive(Debug, Clone, FromRow)]
pub struct AudioRecord {
    /// Storage-generated ID
    pub id: Uuid,
    /// Filename as sent by the uploader
    pub filename: String,
    /// MIME type as sent by the uploader
    pub content_type: String,
    /// Raw file bytes
    pub data: Vec<u8>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

/// Audio file about to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAudioRecord {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Persistence for uploaded audio. Records are write-once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Store a new record and return the generated ID
    async fn insert(&self, audio: NewAudioRecord) -> Result<Uuid>;

    /// Fetch a record by exact ID
    async fn get(&self, id: Uuid) -> Result<Option<AudioRecord>>;

    /// Check that the backing database is reachable
    async fn ping(&self) -> Result<()>;
}

/// Audio store backed by a PostgreSQL `audio_files` table
pub struct PgAudioStore {
    pool: PgPool,
}

impl PgAudioStore {
    /// Create a new audio store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl AudioStore for PgAudioStore {
    #[instrument(skip(self, audio), fields(filename = %audio.filename, size_bytes = audio.data.len()))]
    async fn insert(&self, audio: NewAudioRecord) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO audio_files (filename, content_type, data)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&audio.filename)
        .bind(&audio.content_type)
        .bind(&audio.data)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert audio file")?;

        debug!(audio_id = %id, "Audio file stored");

        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AudioRecord>> {
        let audio = sqlx::query_as::<_, AudioRecord>(
            r#"
            SELECT id, filename, content_type, data, created_at
            FROM audio_files
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query audio file")?;

        Ok(audio)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database is unreachable")?;

        Ok(())
    }
}
