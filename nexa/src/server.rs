use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use nexa_api::{AppState, PermissiveValidator};
use nexa_core::catalog::Catalog;
use nexa_core::config::Config;
use nexa_core::events::LogPublisher;
use nexa_core::repository::{
    CapabilityRepository, GeneratorRepository, SessionRepository, TranscodeJobRepository,
};
use nexa_core::service::{
    CapabilityService, GopIndexService, PlaybackService, PlaylistService, SessionLocks,
    TranscodePolicy,
};
use nexa_transcode::{FfmpegWorkerFactory, SubtitleService, TranscodeManager};

use crate::catalog::DbCatalog;

/// Everything the HTTP layer needs, wired once at startup.
pub struct Services {
    pub state: AppState,
    pub playback: Arc<PlaybackService>,
}

pub async fn init_database(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_seconds))
        .connect(&config.database.url)
        .await?;
    Ok(pool)
}

pub fn init_services(config: &Config, pool: PgPool) -> Services {
    let catalog: Arc<dyn Catalog> = Arc::new(DbCatalog::new(pool.clone()));
    let locks = SessionLocks::new();

    let policy = TranscodePolicy {
        allow_hardware_acceleration: config.transcode.allow_hardware_acceleration,
        // Probing for a capable encoder is deployment-specific; the flag
        // gates it either way.
        hardware_encoder_available: config.transcode.allow_hardware_acceleration,
        allow_tone_mapping: config.transcode.allow_tone_mapping,
    };

    let capabilities = CapabilityService::new(CapabilityRepository::new(pool.clone()));
    let playlist = PlaylistService::new(
        GeneratorRepository::new(pool.clone()),
        Arc::clone(&catalog),
        config.playlist.clone(),
        locks.clone(),
    );
    let gop = GopIndexService::new(Arc::clone(&catalog));

    let factory = Arc::new(FfmpegWorkerFactory::new(
        config.transcode.ffmpeg_path.clone(),
        config.transcode.worker_stop_grace(),
    ));
    let transcode = Arc::new(TranscodeManager::new(
        config.transcode.clone(),
        factory,
        gop.clone(),
        Some(TranscodeJobRepository::new(pool.clone())),
    ));

    let playback = Arc::new(PlaybackService::new(
        SessionRepository::new(pool.clone()),
        capabilities.clone(),
        playlist.clone(),
        Arc::clone(&catalog),
        gop,
        Arc::new(LogPublisher),
        Arc::clone(&transcode) as Arc<dyn nexa_core::service::JobStopper>,
        policy,
        config.session.clone(),
        locks,
    ));

    let state = AppState {
        playback: Arc::clone(&playback),
        playlist,
        capabilities,
        catalog,
        transcode,
        subtitles: SubtitleService::new(config.transcode.clone()),
        policy,
        db: pool,
        auth: Arc::new(PermissiveValidator),
        metrics_enabled: config.server.metrics_enabled,
    };

    Services { state, playback }
}

/// Serve HTTP until shutdown, with the session sweeper running alongside.
pub async fn serve(config: &Config, services: Services) -> Result<()> {
    let sweeper = Arc::clone(&services.playback)
        .spawn_sweeper(config.session.sweep_interval());

    let router = nexa_api::router(services.state);
    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
