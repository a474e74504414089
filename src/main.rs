use std::sync::Arc;

use anyhow::Result;
use sysinfo::System;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use speedtune::audio::StreamRenderer;
use speedtune::cli::{self, CliAction};
use speedtune::config::load_config;
use speedtune::location::{run_sampler, PushedLocation};
use speedtune::node::{spawn_node, Command};
use speedtune::playback::PlaybackController;
use speedtune::playlist::{run_poller, HttpPlaylistFetcher};
use speedtune::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    match cli::parse_args() {
        CliAction::PrintVersion => {
            cli::print_version();
            return Ok(());
        }
        CliAction::InitConfig => {
            cli::init_config_file();
            return Ok(());
        }
        CliAction::RunServer => {}
    }
    let cfg = Arc::new(load_config());
    let logs_dir_str = std::env::var("SPEEDTUNE_LOG_DIR").unwrap_or_else(|_| ".logs".into());
    let logs_dir = std::path::Path::new(&logs_dir_str);

    let stdout_layer = fmt::layer().with_target(false).compact();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter).with(stdout_layer);

    // dropping the guard would stop the file writer
    let _guard_file = match std::fs::create_dir_all(logs_dir) {
        Ok(()) => {
            if cfg.clean_log_on_start {
                let log_path = logs_dir.join("latest.log");
                if let Ok(f) =
                    std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(&log_path)
                {
                    drop(f);
                }
            }
            let file_appender = rolling::never(logs_dir, "latest.log");
            let (file_nb, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer().with_ansi(false).with_target(false).with_writer(file_nb).compact();
            registry.with(file_layer).init();
            Some(guard)
        }
        Err(e) => {
            eprintln!("File logging disabled (cannot create {}): {}", logs_dir.display(), e);
            registry.init();
            None
        }
    };

    log_banner();

    let (renderer_tx, renderer_rx) = mpsc::unbounded_channel();
    let renderer = StreamRenderer::new(cfg.clone(), renderer_tx)?;
    let stream = renderer.stream();
    let controller = PlaybackController::new(renderer).with_policy(cfg.missing_preview);
    let (node, node_task) = spawn_node(controller, renderer_rx);

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let ctrlc_tx = shutdown_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(());
    })
    .ok();

    let location = Arc::new(PushedLocation::new(cfg.speed_unit));
    let (speed_tx, speed_rx) = watch::channel(0.0);
    {
        let location = location.clone();
        let every = cfg.sample_interval;
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { run_sampler(location.as_ref(), speed_tx, every, shutdown).await });
    }

    match cfg.endpoint.as_deref() {
        Some(endpoint) => {
            let fetcher = HttpPlaylistFetcher::new(endpoint, cfg.fetch_timeout)?;
            info!(endpoint, every_ms = cfg.poll_interval.as_millis() as u64, "Playlist poller enabled");
            tokio::spawn(run_poller(
                fetcher,
                speed_rx.clone(),
                node.clone(),
                cfg.poll_interval,
                shutdown_tx.subscribe(),
            ));
        }
        None => warn!("No playlist endpoint configured; playlists must be pushed via PUT /v0/playlist"),
    }

    let state = AppState { node: node.clone(), location, speed: speed_rx, stream, cfg: cfg.clone() };
    let app = speedtune::api::router(state);

    let listener = tokio::net::TcpListener::bind((cfg.host.as_str(), cfg.port)).await?;
    info!(addr = %format!("{}:{}", cfg.host, cfg.port), "Listening");

    tokio::select! {
        res = axum::serve(listener, app) => {
            if let Err(e) = res { tracing::error!(?e, "server error"); }
        }
        _ = shutdown_rx.recv() => { info!("Shutdown signal received"); }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = node.send(Command::Stop).await {
        warn!(%e, "could not stop playback on shutdown");
    }
    drop(node);
    node_task.abort();

    Ok(())
}

fn log_banner() {
    let mut sys = System::new_all();
    sys.refresh_all();
    let version = env!("CARGO_PKG_VERSION");
    let os = System::name().unwrap_or_else(|| "Unknown OS".into());
    let os_ver = System::os_version().unwrap_or_default();
    let total_mem_mb = sys.total_memory() / (1024 * 1024);
    let cpu_brand = sys.cpus().first().map(|c| c.brand().to_string()).unwrap_or_else(|| "Unknown CPU".into());
    if total_mem_mb == 0 {
        warn!("Unable to determine RAM size");
    }

    info!(
        version,
        os = %format!("{} {}", os, os_ver),
        cpu = %cpu_brand,
        ram_mb = total_mem_mb,
        "Speedtune node starting"
    );
}
