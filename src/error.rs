use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;
use crate::models::ErrorBody;
use crate::rate_limit::LimitClass;

pub type Result<T, E = EdgeError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("rate limit exceeded for {class} endpoints")]
    RateLimited {
        class: LimitClass,
        limit: u32,
        retry_after: Duration,
        reset_unix: i64,
    },
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error("upstream returned {status}")]
    UpstreamStatus { status: StatusCode },
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("upstream returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            EdgeError::RateLimited {
                class,
                limit,
                retry_after,
                reset_unix,
            } => {
                // round up so clients never retry before the window resets
                let retry_secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                let body = ErrorBody {
                    class: Some(class),
                    retry_after_secs: Some(retry_secs),
                    ..ErrorBody::new(message)
                };
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                let headers = response.headers_mut();
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_secs));
                headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
                headers.insert("x-ratelimit-reset", HeaderValue::from(reset_unix));
                response
            }
            EdgeError::InvalidInput(_) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody::new(message))).into_response()
            }
            EdgeError::UpstreamStatus { status } => {
                let body = ErrorBody {
                    upstream_status: Some(status.as_u16()),
                    ..ErrorBody::new(message)
                };
                (StatusCode::BAD_GATEWAY, Json(body)).into_response()
            }
            EdgeError::Upstream(_) | EdgeError::Decode(_) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorBody::new(message))).into_response()
            }
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} window must be greater than zero")]
    ZeroWindow { name: &'static str },
    #[error("{name} window must be at most {max_secs} seconds")]
    WindowTooLarge { name: &'static str, max_secs: u64 },
    #[error("{name} quota must be greater than zero")]
    ZeroQuota { name: &'static str },
    #[error("cache size must be greater than zero")]
    ZeroCacheSize,
    #[error("cache TTL must be a positive number of minutes, got {0}")]
    InvalidTtl(f64),
    #[error("upstream URL must start with http:// or https://, got {0}")]
    InvalidUpstream(String),
}
