pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::middleware::auth::auth_middleware;
use crate::state::AppState;
use handlers::{
    info, load_playlist, next, pause, play, playlist, previous, report_location, resume, session, speed, stop,
    version, ws_events, ws_stream,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v0/session", get(session))
        .route("/v0/playlist", get(playlist).put(load_playlist))
        .route("/v0/play/{index}", post(play))
        .route("/v0/pause", post(pause))
        .route("/v0/resume", post(resume))
        .route("/v0/next", post(next))
        .route("/v0/previous", post(previous))
        .route("/v0/stop", post(stop))
        .route("/v0/location", post(report_location))
        .route("/v0/speed", get(speed))
        .route("/v0/stream", get(ws_stream))
        .route("/v0/events", get(ws_events))
        .route("/info", get(info))
        .route("/version", get(version))
        .with_state(state.clone())
        .layer(axum::middleware::from_fn_with_state(state, auth_middleware))
}
