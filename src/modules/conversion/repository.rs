use super::model::Metadata;
use crate::infrastructure::db::pool::DbPool;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("duplicate metadata entry")]
    Duplicate,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Metadata persistence capability.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert(&self, metadata: &Metadata) -> Result<(), MetadataError>;

    /// Looks up a previously recorded conversion of the same source.
    async fn find(
        &self,
        user_id: i64,
        file_name: &str,
        video_key: &str,
    ) -> Result<Option<Metadata>, MetadataError>;
}

#[derive(Clone)]
pub struct MetadataRepository {
    pool: DbPool,
}

impl MetadataRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Ensures the metadata table exists before the worker starts consuming.
    pub async fn migrate(pool: &DbPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL,
                file_name TEXT NOT NULL,
                video_key TEXT NOT NULL,
                audio_key TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MetadataRepository {
    async fn insert(&self, metadata: &Metadata) -> Result<(), MetadataError> {
        sqlx::query(
            r#"
            INSERT INTO metadata (user_id, file_name, video_key, audio_key)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(metadata.user_id)
        .bind(&metadata.file_name)
        .bind(&metadata.video_key)
        .bind(&metadata.audio_key)
        .execute(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                MetadataError::Duplicate
            }
            _ => MetadataError::Database(err),
        })?;

        Ok(())
    }

    async fn find(
        &self,
        user_id: i64,
        file_name: &str,
        video_key: &str,
    ) -> Result<Option<Metadata>, MetadataError> {
        let row = sqlx::query_as::<_, Metadata>(
            r#"
            SELECT user_id, file_name, video_key, audio_key
            FROM metadata
            WHERE user_id = $1 AND file_name = $2 AND video_key = $3
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(file_name)
        .bind(video_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
