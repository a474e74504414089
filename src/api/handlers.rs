use axum::{
    extract::{ws::Message, Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::audio::StreamPacket;
use crate::location::LocationFix;
use crate::node::{Command, NodeError, NodeEvent};
use crate::playback::{ControlError, PlaybackSession, Playlist};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Node(#[from] NodeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::Node(NodeError::Control(e)) => {
                let status = match e {
                    ControlError::IndexOutOfRange { .. } => StatusCode::NOT_FOUND,
                    ControlError::NoPreviewAvailable { .. } => StatusCode::CONFLICT,
                    ControlError::Playback(_) => StatusCode::BAD_GATEWAY,
                };
                (status, e.kind())
            }
            ApiError::Node(NodeError::Closed) => (StatusCode::SERVICE_UNAVAILABLE, "node_closed"),
        };
        let body = serde_json::json!({ "error": kind, "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

type SessionResult = Result<Json<PlaybackSession>, ApiError>;

async fn command(state: &AppState, cmd: Command) -> SessionResult {
    Ok(Json(state.node.send(cmd).await?))
}

pub async fn session(State(state): State<AppState>) -> Json<PlaybackSession> {
    Json(state.node.snapshot())
}

pub async fn playlist(State(state): State<AppState>) -> Json<Playlist> {
    Json(state.node.snapshot().playlist)
}

pub async fn load_playlist(State(state): State<AppState>, Json(playlist): Json<Playlist>) -> SessionResult {
    info!(tracks = playlist.len(), "playlist pushed by client");
    command(&state, Command::LoadPlaylist(playlist)).await
}

pub async fn play(State(state): State<AppState>, Path(index): Path<usize>) -> SessionResult {
    command(&state, Command::Play(index)).await
}

pub async fn pause(State(state): State<AppState>) -> SessionResult {
    command(&state, Command::Pause).await
}

pub async fn resume(State(state): State<AppState>) -> SessionResult {
    command(&state, Command::Resume).await
}

pub async fn next(State(state): State<AppState>) -> SessionResult {
    command(&state, Command::Next).await
}

pub async fn previous(State(state): State<AppState>) -> SessionResult {
    command(&state, Command::Previous).await
}

pub async fn stop(State(state): State<AppState>) -> SessionResult {
    command(&state, Command::Stop).await
}

pub async fn report_location(State(state): State<AppState>, Json(fix): Json<LocationFix>) -> StatusCode {
    state.location.record(fix);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
pub struct SpeedRes {
    pub speed: f64,
    pub unit: &'static str,
    pub latest_fix: Option<LocationFix>,
}

pub async fn speed(State(state): State<AppState>) -> Json<SpeedRes> {
    Json(SpeedRes {
        speed: *state.speed.borrow(),
        unit: state.location.unit().label(),
        latest_fix: state.location.latest(),
    })
}

#[derive(Debug, Serialize)]
pub struct InfoRes {
    pub name: &'static str,
    pub version: &'static str,
    pub playlist_endpoint: bool,
    pub speed_unit: &'static str,
    pub missing_preview: crate::playback::MissingPreviewPolicy,
}

pub async fn info(State(state): State<AppState>) -> Json<InfoRes> {
    Json(InfoRes {
        name: "speedtune",
        version: env!("CARGO_PKG_VERSION"),
        playlist_endpoint: state.cfg.endpoint.is_some(),
        speed_unit: state.cfg.speed_unit.label(),
        missing_preview: state.cfg.missing_preview,
    })
}

pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub async fn ws_stream(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let rx = state.stream.subscribe();
    info!("PCM stream subscriber connected");
    ws.on_upgrade(move |socket| async move { stream_task(socket, rx).await })
}

async fn stream_task(
    mut socket: axum::extract::ws::WebSocket,
    mut rx: tokio::sync::broadcast::Receiver<StreamPacket>,
) {
    let mut ws_forwarded: u64 = 0;
    loop {
        tokio::select! {
            msg = rx.recv() => {
                let out = match msg {
                    Ok(StreamPacket::Start { cue, sample_rate, channels }) => {
                        let header = serde_json::json!({
                            "type": "start",
                            "index": cue.index,
                            "seq": cue.seq,
                            "sample_rate": sample_rate,
                            "channels": channels,
                            "format": "s16le",
                        });
                        Message::Text(header.to_string().into())
                    }
                    Ok(StreamPacket::Pcm(pkt)) => Message::Binary(pkt),
                    Err(RecvError::Lagged(n)) => {
                        warn!(lost = n, "WS lagged; dropped packets");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if socket.send(out).await.is_err() { break; }
                ws_forwarded += 1;
                if ws_forwarded % 1000 == 0 { info!(ws_forwarded, "WS forwarded frames (summary)"); }
            }
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

pub async fn ws_events(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let rx = state.node.subscribe();
    let initial = NodeEvent::Session { session: state.node.snapshot() };
    ws.on_upgrade(move |socket| async move { events_task(socket, initial, rx).await })
}

async fn events_task(
    mut socket: axum::extract::ws::WebSocket,
    initial: NodeEvent,
    mut rx: tokio::sync::broadcast::Receiver<NodeEvent>,
) {
    let mut pending = Some(initial);
    loop {
        let event = match pending.take() {
            Some(ev) => ev,
            None => tokio::select! {
                msg = rx.recv() => match msg {
                    Ok(ev) => ev,
                    Err(RecvError::Lagged(n)) => {
                        warn!(lost = n, "event subscriber lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                incoming = socket.next() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                },
            },
        };
        let text = match serde_json::to_string(&event) {
            Ok(t) => t,
            Err(e) => {
                warn!(%e, "failed to serialize event");
                continue;
            }
        };
        if socket.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}
