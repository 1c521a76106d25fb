use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    RedisUrl,
    S3Endpoint,
    S3Bucket,
    S3Region,
    S3AccessKey,
    S3SecretKey,
    LocalMediaPrefix,
    LocalMediaRoot,
    TranscodeDir,
    FfmpegPath,
    EncoderTimeoutSecs,
    SignedUrlTtlSecs,
    NotifyOnFailure,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::S3Endpoint => "S3_ENDPOINT",
            EnvKey::S3Bucket => "S3_BUCKET_MEDIA",
            EnvKey::S3Region => "S3_REGION",
            EnvKey::S3AccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::S3SecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::LocalMediaPrefix => "LOCAL_MEDIA_PREFIX",
            EnvKey::LocalMediaRoot => "LOCAL_MEDIA_ROOT",
            EnvKey::TranscodeDir => "TRANSCODE_DIR",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::EncoderTimeoutSecs => "ENCODER_TIMEOUT_SECS",
            EnvKey::SignedUrlTtlSecs => "SIGNED_URL_TTL_SECS",
            EnvKey::NotifyOnFailure => "NOTIFY_ON_FAILURE",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("missing environment variable {0}")]
pub struct MissingEnv(pub &'static str);

pub fn get(key: EnvKey) -> Result<String, MissingEnv> {
    env::var(key.as_str()).map_err(|_| MissingEnv(key.as_str()))
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
