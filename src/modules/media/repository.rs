use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::model::{MediaAsset, MediaRow};
use crate::infrastructure::db::pool::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt media row {id}: {reason}")]
    CorruptRow { id: Uuid, reason: String },

    #[error("Media {0} does not exist")]
    Missing(Uuid),
}

/// Persistence for media assets, as seen by the processing pipeline.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<MediaAsset>, StoreError>;

    /// Writes the storage key and processing status together.
    async fn save(&self, asset: &MediaAsset) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgMediaRepository {
    pool: DbPool,
}

impl PgMediaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetStore for PgMediaRepository {
    async fn get(&self, id: Uuid) -> Result<Option<MediaAsset>, StoreError> {
        let row = sqlx::query_as::<_, MediaRow>(
            r#"
            SELECT id, creator_id, media_type::text AS media_type, file_path, filename,
                   content_type, size_bytes::int8 AS size_bytes,
                   processing_status::text AS processing_status
            FROM cms_media
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let id = r.id;
            MediaAsset::try_from(r).map_err(|reason| StoreError::CorruptRow { id, reason })
        })
        .transpose()
    }

    async fn save(&self, asset: &MediaAsset) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE cms_media SET file_path = $1, processing_status = $2 WHERE id = $3",
        )
        .bind(&asset.storage_key)
        .bind(asset.status.as_str())
        .bind(asset.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(asset.id));
        }
        Ok(())
    }
}
