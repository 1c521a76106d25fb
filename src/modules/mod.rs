pub mod media;
pub mod notification;
