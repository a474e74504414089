use axum::extract::State;
use axum::{http::StatusCode, middleware::Next};

use crate::state::AppState;

/// Accepts the configured password either raw or as a bearer token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if let Some(pw) = &state.cfg.password {
        let hdr = req
            .headers()
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(|v| v.strip_prefix("Bearer ").unwrap_or(v));
        match hdr {
            Some(val) if val == pw => {}
            _ => return Err(StatusCode::UNAUTHORIZED),
        }
    }
    Ok(next.run(req).await)
}
