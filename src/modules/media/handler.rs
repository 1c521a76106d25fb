use super::dto::{MediaResponse, TranscodeResponse};
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Get media processing status
#[utoipa::path(
    get,
    path = "/api/v1/media/{id}",
    params(
        ("id" = Uuid, Path, description = "Media ID")
    ),
    responses(
        (status = 200, description = "Media status", body = ApiResponse<MediaResponse>),
        (status = 404, description = "Media not found")
    ),
    tag = "Media"
)]
pub async fn get_media(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.media.find_by_id(id).await {
        Ok(media) => ApiSuccess(
            ApiResponse::success(media, "Media retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Queue a video for transcoding
#[utoipa::path(
    post,
    path = "/api/v1/media/{id}/transcode",
    params(
        ("id" = Uuid, Path, description = "Media ID")
    ),
    responses(
        (status = 202, description = "Transcode queued", body = ApiResponse<TranscodeResponse>),
        (status = 400, description = "Media is not a video"),
        (status = 404, description = "Media not found"),
        (status = 409, description = "Media is already transcoded")
    ),
    tag = "Media"
)]
pub async fn transcode_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.media.request_transcode(id).await {
        Ok(accepted) => ApiSuccess(
            ApiResponse::success(accepted, "Transcode queued"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
