use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::media::handler::get_media,
        crate::modules::media::handler::transcode_media,
    ),
    components(
        schemas(
            crate::modules::media::dto::MediaResponse,
            crate::modules::media::dto::TranscodeResponse,
            crate::modules::media::model::MediaKind,
            crate::modules::media::model::ProcessingStatus,
        )
    ),
    tags(
        (name = "Media", description = "Media processing")
    )
)]
pub struct ApiDoc;
