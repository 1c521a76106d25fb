use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use super::model::{Notification, NotificationEvent};
use crate::infrastructure::db::pool::DbPool;
use crate::infrastructure::redis::client::RedisService;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to store notification: {0}")]
    Store(#[from] sqlx::Error),
}

/// Fire-and-forget delivery of user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Clone)]
pub struct NotificationService {
    db: DbPool,
    redis: RedisService,
}

impl NotificationService {
    pub fn new(db: DbPool, redis: RedisService) -> Self {
        Self { db, redis }
    }

    pub fn channel_for(user_id: Uuid) -> String {
        format!("notifications:{}", user_id)
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let (id, created_at): (Uuid, OffsetDateTime) = sqlx::query_as(
            r#"
            INSERT INTO notifications (user_id, title, message, is_read, resource_type, resource_id)
            VALUES ($1, $2, $3, FALSE, $4, $5)
            RETURNING id, created_at
            "#,
        )
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.resource_type)
        .bind(&notification.resource_id)
        .fetch_one(&self.db)
        .await?;

        let event = NotificationEvent {
            id,
            title: &notification.title,
            message: &notification.message,
            resource_type: notification.resource_type.as_deref(),
            resource_id: notification.resource_id.as_deref(),
            created_at,
        };

        // Live delivery is best effort; the stored row is the source of truth.
        match serde_json::to_string(&event) {
            Ok(payload) => {
                let channel = Self::channel_for(notification.user_id);
                match self.redis.publish(&channel, &payload).await {
                    Ok(receivers) => {
                        debug!("Notification {} pushed to {} receivers", id, receivers)
                    }
                    Err(e) => warn!("Failed to publish notification {}: {}", id, e),
                }
            }
            Err(e) => warn!("Failed to encode notification {}: {}", id, e),
        }

        Ok(())
    }
}
