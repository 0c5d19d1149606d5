use axum::{
    Json,
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use crate::cache::make_cache_key;
use crate::error::Result;
use crate::rate_limit::LimitClass;
use crate::state::AppState;
use super::{admit, client_identifier, validate_segment};

// Profiles change more often than the category and tag lists
const PROFILE_TTL_MINUTES: f64 = 1.0;

const CATEGORIES: &str = "categories?select=*&order=name.asc";
const TAGS: &str = "tags?select=*&order=name.asc";

fn profile_resource(id: &str) -> String {
    format!("profiles?select=*&id=eq.{id}")
}

// Shared lists are hit by every visitor at once, so misses are coalesced
async fn shared_list(
    state: &AppState,
    headers: &HeaderMap,
    peer: SocketAddr,
    resource: &str,
) -> Result<(HeaderMap, Json<Value>)> {
    let client = client_identifier(headers, peer);
    let rate_headers = admit(state, LimitClass::Api, &client)?;

    let key = make_cache_key("GET", resource);
    let body = state
        .cache
        .coalesced_fetch(&key, || state.upstream.get_json(resource), None)
        .await?;
    Ok((rate_headers, Json(body)))
}

pub async fn categories_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Json<Value>)> {
    shared_list(&state, &headers, peer, CATEGORIES).await
}

pub async fn tags_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Json<Value>)> {
    shared_list(&state, &headers, peer, TAGS).await
}

pub async fn profile_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Json<Value>)> {
    let client = client_identifier(&headers, peer);
    let rate_headers = admit(&state, LimitClass::Api, &client)?;
    validate_segment("profile id", &id)?;

    let resource = profile_resource(&id);
    let key = make_cache_key("GET", &resource);
    let body = state
        .cache
        .cached_fetch(&key, || state.upstream.get_json(&resource), Some(PROFILE_TTL_MINUTES))
        .await?;
    Ok((rate_headers, Json(body)))
}

pub async fn invalidate_profile_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Json<Value>)> {
    let client = client_identifier(&headers, peer);
    let rate_headers = admit(&state, LimitClass::Api, &client)?;
    validate_segment("profile id", &id)?;

    let removed = state.cache.delete(&make_cache_key("GET", &profile_resource(&id)));
    Ok((rate_headers, Json(json!({ "invalidated": removed }))))
}
