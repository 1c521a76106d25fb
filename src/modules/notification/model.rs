use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A message addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
}

impl Notification {
    pub fn media_ready(user_id: Uuid, media_id: Uuid, filename: &str) -> Self {
        Self {
            user_id,
            title: "Media Ready".to_string(),
            message: format!("Your video '{}' is ready to watch.", filename),
            resource_type: Some("media".to_string()),
            resource_id: Some(media_id.to_string()),
        }
    }

    pub fn media_failed(user_id: Uuid, media_id: Uuid, filename: &str) -> Self {
        Self {
            user_id,
            title: "Media Processing Failed".to_string(),
            message: format!("Your video '{}' could not be processed.", filename),
            resource_type: Some("media".to_string()),
            resource_id: Some(media_id.to_string()),
        }
    }
}

/// Payload pushed to live clients after the row is stored.
#[derive(Debug, Serialize)]
pub struct NotificationEvent<'a> {
    pub id: Uuid,
    pub title: &'a str,
    pub message: &'a str,
    pub resource_type: Option<&'a str>,
    pub resource_id: Option<&'a str>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
