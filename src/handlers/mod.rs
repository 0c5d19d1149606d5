mod auth;
mod catalog;
mod health;
mod metrics;
mod submit;
#[cfg(test)]
mod tests;

use axum::{
    Router,
    http::{HeaderMap, HeaderValue},
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use crate::error::{EdgeError, Result};
use crate::metrics::{RATE_LIMITED, REQUEST_TOTAL};
use crate::rate_limit::LimitClass;
use crate::state::AppState;

pub use auth::auth_handler;
pub use catalog::{categories_handler, invalidate_profile_handler, profile_handler, tags_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use submit::submission_handler;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/categories", get(categories_handler))
        .route("/api/tags", get(tags_handler))
        .route("/api/profiles/{id}", get(profile_handler))
        .route("/api/profiles/{id}/cache", delete(invalidate_profile_handler))
        .route("/api/auth/{action}", post(auth_handler))
        .route("/api/submissions", post(submission_handler))
        .with_state(state)
}

// Client identity: first X-Forwarded-For hop, then X-Real-IP, then the peer address
pub(crate) fn client_identifier(headers: &HeaderMap, peer: SocketAddr) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Runs the admission check for `class` and returns the rate limit headers
/// to attach to the response, or a `RateLimited` error when denied.
pub(crate) fn admit(state: &AppState, class: LimitClass, client: &str) -> Result<HeaderMap> {
    REQUEST_TOTAL.inc();
    let limiter = state.limiters.for_class(class);
    let decision = limiter.check(client);
    let retry_after = decision.retry_after(Instant::now());
    let reset_unix = chrono::Utc::now().timestamp() + retry_after.as_secs_f64().ceil() as i64;

    if !decision.allowed {
        RATE_LIMITED.with_label_values(&[class.as_str()]).inc();
        warn!(%client, %class, tracked = limiter.len(), "rate limit exceeded");
        return Err(EdgeError::RateLimited {
            class,
            limit: limiter.max_requests(),
            retry_after,
            reset_unix,
        });
    }
    debug!(%client, %class, remaining = decision.remaining, "request admitted");

    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", HeaderValue::from(limiter.max_requests()));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset_unix));
    Ok(headers)
}

// Path segments are spliced into upstream URLs, so only plain identifiers pass
pub(crate) fn validate_segment(what: &str, value: &str) -> Result<()> {
    let plain = !value.is_empty()
        && value.len() <= 128
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        Ok(())
    } else {
        Err(EdgeError::InvalidInput(format!("malformed {what}")))
    }
}
