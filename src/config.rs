use clap::Parser;
use std::time::Duration;
use crate::error::ConfigError;
use crate::rate_limit::{AdmissionLimiter, Limiters, MAX_WINDOW};

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "blogrolly-edge")]
#[command(about = "Rate-limited caching edge for the BlogRolly data API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Base URL of the backend REST API
    #[arg(short, long, default_value = "http://localhost:54321/rest/v1")]
    pub upstream: String,

    // API key forwarded to the backend as the `apikey` header
    #[arg(long, env = "UPSTREAM_API_KEY")]
    pub upstream_key: Option<String>,

    // Timeout imposed on every backend request, in seconds
    #[arg(long, default_value_t = 10)]
    pub upstream_timeout_secs: u64,

    // Maximum number of cached responses
    #[arg(long, default_value_t = 100)]
    pub cache_max_size: usize,

    // Default cache TTL in minutes
    #[arg(long, default_value_t = 5.0)]
    pub cache_ttl_minutes: f64,

    // Auth endpoints: window in seconds and max requests per window
    #[arg(long, default_value_t = 900)]
    pub auth_window_secs: u64,
    #[arg(long, default_value_t = 5)]
    pub auth_max: u32,

    // General API endpoints
    #[arg(long, default_value_t = 60)]
    pub api_window_secs: u64,
    #[arg(long, default_value_t = 100)]
    pub api_max: u32,

    // Blog submission endpoints
    #[arg(long, default_value_t = 3600)]
    pub submission_window_secs: u64,
    #[arg(long, default_value_t = 3)]
    pub submission_max: u32,
}

impl Args {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("auth", self.auth_window_secs, self.auth_max),
            ("api", self.api_window_secs, self.api_max),
            ("submission", self.submission_window_secs, self.submission_max),
        ];
        for (name, window, max) in limits {
            if window == 0 {
                return Err(ConfigError::ZeroWindow { name });
            }
            if window > MAX_WINDOW.as_secs() {
                return Err(ConfigError::WindowTooLarge {
                    name,
                    max_secs: MAX_WINDOW.as_secs(),
                });
            }
            if max == 0 {
                return Err(ConfigError::ZeroQuota { name });
            }
        }
        if self.cache_max_size == 0 {
            return Err(ConfigError::ZeroCacheSize);
        }
        if !self.cache_ttl_minutes.is_finite() || self.cache_ttl_minutes <= 0.0 {
            return Err(ConfigError::InvalidTtl(self.cache_ttl_minutes));
        }
        if !(self.upstream.starts_with("http://") || self.upstream.starts_with("https://")) {
            return Err(ConfigError::InvalidUpstream(self.upstream.clone()));
        }
        Ok(())
    }

    pub fn limiters(&self) -> Limiters {
        Limiters {
            auth: AdmissionLimiter::new(Duration::from_secs(self.auth_window_secs), self.auth_max),
            api: AdmissionLimiter::new(Duration::from_secs(self.api_window_secs), self.api_max),
            submission: AdmissionLimiter::new(
                Duration::from_secs(self.submission_window_secs),
                self.submission_max,
            ),
        }
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
