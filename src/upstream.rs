use axum::http::StatusCode;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::warn;
use crate::error::{EdgeError, Result};
use crate::metrics::UPSTREAM_LATENCY;

// Thin client for the backend REST API
pub struct Upstream {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl Upstream {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .timeout(self.timeout);
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    /// GETs `path` and decodes the body. Any non-success status is an error.
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let start = Instant::now();
        let res = self.request(reqwest::Method::GET, path).send().await;
        UPSTREAM_LATENCY.observe(start.elapsed().as_secs_f64());

        let res = res.inspect_err(|e| warn!(%path, error = %e, "upstream request failed"))?;
        let status = res.status();
        if !status.is_success() {
            warn!(%path, %status, "upstream returned an error status");
            return Err(EdgeError::UpstreamStatus { status });
        }
        decode(&res.bytes().await?)
    }

    /// POSTs `body` to `path` and hands back the upstream status with its
    /// body, so callers can relay validation errors as-is.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<(StatusCode, Value)> {
        let start = Instant::now();
        let res = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await;
        UPSTREAM_LATENCY.observe(start.elapsed().as_secs_f64());

        let res = res.inspect_err(|e| warn!(%path, error = %e, "upstream request failed"))?;
        let status = res.status();
        let payload = decode(&res.bytes().await?)?;
        Ok((status, payload))
    }
}

// Empty bodies (e.g. 204) decode to null
fn decode(bytes: &[u8]) -> Result<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(bytes)?)
}
