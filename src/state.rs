use crate::modules::media::service::MediaService;

#[derive(Clone)]
pub struct AppState {
    pub media: MediaService,
}

impl AppState {
    pub fn new(media: MediaService) -> Self {
        Self { media }
    }
}
