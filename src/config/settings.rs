use std::path::PathBuf;
use std::time::Duration;

use crate::config::env::{self, EnvKey, MissingEnv};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub storage: StorageConfig,
    pub media: MediaConfig,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub signed_url_ttl: Duration,
}

/// Knobs for the processing pipeline.
#[derive(Clone, Debug)]
pub struct MediaConfig {
    /// Keys starting with this prefix live on local disk.
    pub local_prefix: String,
    /// Directory local keys are resolved against.
    pub local_root: PathBuf,
    /// Parent directory of the per-run workspaces.
    pub transcode_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub encoder_timeout: Duration,
    pub notify_on_failure: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            local_prefix: "/static".to_string(),
            local_root: PathBuf::from("."),
            transcode_dir: std::env::temp_dir().join("transcoding"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            encoder_timeout: Duration::from_secs(3600),
            notify_on_failure: false,
        }
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, MissingEnv> {
        let defaults = MediaConfig::default();
        let transcode_dir = env::get(EnvKey::TranscodeDir)
            .map(PathBuf::from)
            .unwrap_or(defaults.transcode_dir);

        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get(EnvKey::DatabaseUrl)?,
            redis_url: env::get(EnvKey::RedisUrl)?,
            storage: StorageConfig {
                endpoint: env::get(EnvKey::S3Endpoint)?,
                bucket: env::get(EnvKey::S3Bucket)?,
                region: env::get_or(EnvKey::S3Region, "us-east-1"),
                access_key: env::get(EnvKey::S3AccessKey)?,
                secret_key: env::get(EnvKey::S3SecretKey)?,
                signed_url_ttl: Duration::from_secs(env::get_parsed(
                    EnvKey::SignedUrlTtlSecs,
                    3600,
                )),
            },
            media: MediaConfig {
                local_prefix: env::get_or(EnvKey::LocalMediaPrefix, &defaults.local_prefix),
                local_root: PathBuf::from(env::get_or(EnvKey::LocalMediaRoot, ".")),
                transcode_dir,
                ffmpeg_path: PathBuf::from(env::get_or(EnvKey::FfmpegPath, "ffmpeg")),
                encoder_timeout: Duration::from_secs(env::get_parsed(
                    EnvKey::EncoderTimeoutSecs,
                    3600,
                )),
                notify_on_failure: env::get_parsed(EnvKey::NotifyOnFailure, false),
            },
        })
    }
}
