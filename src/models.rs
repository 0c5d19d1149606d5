use serde::{Deserialize, Serialize};
use crate::rate_limit::LimitClass;

// Health endpoint response
#[derive(Deserialize, Serialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

// JSON error body returned for every failed request
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<LimitClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            class: None,
            retry_after_secs: None,
            upstream_status: None,
        }
    }
}
