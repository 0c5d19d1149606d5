use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use crate::error::Result;
use crate::rate_limit::LimitClass;
use crate::state::AppState;
use super::{admit, client_identifier};

// Blog submissions: relayed to the backend, then cached listings are dropped
pub async fn submission_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, HeaderMap, Json<Value>)> {
    let client = client_identifier(&headers, peer);
    let rate_headers = admit(&state, LimitClass::Submission, &client)?;

    let (status, body) = state.upstream.post_json("submissions", &payload).await?;
    if status.is_success() {
        state.cache.clear();
    }
    info!(%client, %status, "submission relayed");
    Ok((status, rate_headers, Json(body)))
}
