use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::node::{Command, NodeHandle};
use crate::playback::Playlist;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid playlist endpoint: {0}")]
    Endpoint(String),
    #[error("playlist request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("playlist service returned {0}")]
    Status(StatusCode),
    #[error("playlist response is not a track list: {0}")]
    Parse(#[from] serde_json::Error),
}

pub trait PlaylistFetcher {
    fn fetch(&self, speed: f64) -> impl Future<Output = Result<Playlist, FetchError>> + Send;
}

#[derive(Clone)]
pub struct HttpPlaylistFetcher {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpPlaylistFetcher {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, FetchError> {
        let parsed = url::Url::parse(endpoint).map_err(|e| FetchError::Endpoint(format!("{endpoint}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::Endpoint(format!("{endpoint}: unsupported scheme")));
        }
        let http = reqwest::Client::builder()
            .user_agent(format!("Speedtune/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http, endpoint: endpoint.trim_end_matches('/').to_string() })
    }

    pub fn url_for(&self, speed: f64) -> String {
        format!("{}/{}", self.endpoint, speed)
    }
}

impl PlaylistFetcher for HttpPlaylistFetcher {
    async fn fetch(&self, speed: f64) -> Result<Playlist, FetchError> {
        let url = self.url_for(speed);
        debug!(%url, "fetching playlist");
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = resp.bytes().await?;
        let playlist: Playlist = serde_json::from_slice(&body)?;
        Ok(playlist)
    }
}

/// Fetch at start, on every tick and on every speed change. Only a list that
/// differs from the loaded one is sent to the node, since loading always stops
/// playback.
pub async fn run_poller<F: PlaylistFetcher>(
    fetcher: F,
    mut speed: watch::Receiver<f64>,
    node: NodeHandle,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut speed_open = true;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            changed = speed.changed(), if speed_open => {
                if changed.is_err() {
                    speed_open = false;
                    continue;
                }
                tick.reset();
            }
            _ = shutdown.recv() => break,
        }

        let current = *speed.borrow_and_update();
        match fetcher.fetch(current).await {
            Ok(playlist) => {
                if node.snapshot().playlist == playlist {
                    debug!(speed = current, tracks = playlist.len(), "playlist unchanged");
                    continue;
                }
                info!(speed = current, tracks = playlist.len(), "loading new playlist");
                if let Err(e) = node.send(Command::LoadPlaylist(playlist)).await {
                    warn!(%e, "node closed; stopping playlist poller");
                    break;
                }
            }
            Err(e) => warn!(speed = current, %e, "playlist fetch failed"),
        }
    }
    debug!("playlist poller stopped");
}
