mod page;
mod routes;

use mosaic_common::config::Config;
use mosaic_refresher::capture::{check_ffmpeg_available, FfmpegCapture};
use mosaic_refresher::playlist::PlaylistFetcher;
use mosaic_refresher::scheduler::CycleScheduler;
use mosaic_refresher::snapshot::snapshot_slot;
use routes::AppState;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("config error: {0}")]
    Config(#[from] mosaic_common::config::ConfigError),
    #[error("playlist client error: {0}")]
    Playlist(#[from] mosaic_refresher::playlist::PlaylistError),
    #[error("failed to bind to {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() {
    let arg = std::env::args().nth(1);
    match arg.as_deref() {
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            return;
        }
        Some("version") | Some("--version") => {
            println!("Mosaic v{VERSION}");
            return;
        }
        _ => {}
    }

    let config_path = arg
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    if let Err(e) = run(config).await {
        error!(error = %e, "mosaic exited with error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), ApiError> {
    let refresh = config.refresh_config();
    info!(
        listen = %config.server.listen,
        playlists = refresh.sources.len(),
        concurrency = refresh.concurrency,
        batch_size = refresh.batch_size,
        "starting mosaic"
    );

    check_ffmpeg_available(&config.capture.ffmpeg).await;

    let playlists = Arc::new(PlaylistFetcher::new(Duration::from_secs(
        config.playlist.request_timeout_secs,
    ))?);
    let capture = Arc::new(FfmpegCapture::new(&config.capture));
    let (publisher, reader) = snapshot_slot();

    let scheduler = CycleScheduler::new(refresh, playlists, capture, publisher);
    let state = Arc::new(AppState {
        snapshots: reader,
        scheduler: scheduler.state(),
    });

    let token = CancellationToken::new();
    let refresh_task = tokio::spawn(scheduler.run(token.clone()));

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .map_err(|e| ApiError::Bind(config.server.listen.clone(), e))?;
    info!(addr = %config.server.listen, "HTTP server listening");

    let shutdown = token.clone();
    let served = axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                error!("failed to listen for ctrl-c, shutting down");
            }
            info!("shutdown requested, finishing current refresh cycle");
            shutdown.cancel();
        })
        .await
        .map_err(ApiError::Serve);

    // The server may also stop on its own error; the refresh loop must not outlive it.
    token.cancel();
    wait_for_refresh(refresh_task, async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    })
    .await;

    served
}

/// Let the refresh loop finish its current cycle, unless `force` resolves first.
async fn wait_for_refresh<F>(mut task: JoinHandle<()>, force: F)
where
    F: Future<Output = ()>,
{
    tokio::select! {
        joined = &mut task => {
            if let Err(e) = joined {
                error!(error = %e, "refresh task panicked");
            }
        }
        _ = force => {
            warn!("interrupted again, abandoning the current refresh cycle");
            task.abort();
        }
    }
}

fn print_usage() {
    println!(
        r#"Mosaic v{VERSION}

Usage:
    mosaic help|version|CONFIG

commands:
    help        print help
    version     print version

CONFIG:         path to a TOML configuration file (default: config.toml)

config format:

[server]
listen = "0.0.0.0:8004"

[refresh]
concurrency = 10              # capture runs in flight at once
batch_size = 4                # channels per run, captured one after another
min_cycle_interval_secs = 10  # pause before a worker slot takes its next run
min_cycle_duration_secs = 30  # minimum time between refresh cycle starts
playlists = ["http://example.com/playlist.m3u8"]

[capture]
ffmpeg = "ffmpeg"
timeout_secs = 5
seek_secs = 2
width = 160
height = 100

[playlist]
request_timeout_secs = 3

[logging]
level = "info"                # overridden by RUST_LOG
"#
    );
}
