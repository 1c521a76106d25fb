use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

use config::settings::AppConfig;
use infrastructure::db::pool::{connect_to_db, run_migrations};
use infrastructure::redis::client::RedisService;
use infrastructure::storage::s3::StorageService;
use modules::media::repository::PgMediaRepository;
use modules::media::service::MediaService;
use modules::notification::service::NotificationService;
use workers::dispatcher::JobDispatcher;
use workers::encoder::FfmpegEncoder;
use workers::pipeline::{MediaPipeline, PipelineDeps};
use workers::scheduler::JobScheduler;
use workers::source::StorageLayout;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("Invalid configuration")?;

    let db = connect_to_db(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    run_migrations(&db).await.context("Failed to apply migrations")?;
    let redis = RedisService::new(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    let storage = Arc::new(StorageService::new(&config.storage));
    let assets = Arc::new(PgMediaRepository::new(db.clone()));

    let pipeline = MediaPipeline::new(
        PipelineDeps {
            assets: assets.clone(),
            notifier: Arc::new(NotificationService::new(db, redis)),
            storage: storage.clone(),
            encoder: Arc::new(FfmpegEncoder::new(
                config.media.ffmpeg_path.clone(),
                config.media.encoder_timeout,
            )),
        },
        &config.media,
    );

    let mut scheduler = JobScheduler::new(Arc::new(JobDispatcher::new(Arc::new(pipeline))));
    scheduler.start()?;

    let media = MediaService::new(
        assets,
        storage,
        scheduler.queue(),
        StorageLayout::new(config.media.local_prefix.clone(), config.media.local_root.clone()),
        config.storage.signed_url_ttl,
    );

    let addr = format!("0.0.0.0:{}", config.server_port);
    let app = app::create_app(state::AppState::new(media));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scheduler.stop().await;
    served.context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
