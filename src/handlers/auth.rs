use axum::{
    Json,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use crate::error::Result;
use crate::rate_limit::LimitClass;
use crate::state::AppState;
use super::{admit, client_identifier, validate_segment};

// Sign-in, sign-up and recovery calls, relayed to the backend auth API
pub async fn auth_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, HeaderMap, Json<Value>)> {
    let client = client_identifier(&headers, peer);
    let rate_headers = admit(&state, LimitClass::Auth, &client)?;
    validate_segment("auth action", &action)?;

    let (status, body) = state
        .upstream
        .post_json(&format!("auth/{action}"), &payload)
        .await?;
    info!(%client, %action, %status, "auth request relayed");
    Ok((status, rate_headers, Json(body)))
}
