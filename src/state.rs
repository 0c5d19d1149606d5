use serde_json::Value;
use crate::cache::EphemeralCache;
use crate::rate_limit::Limiters;
use crate::upstream::Upstream;
// app's shared state, built once in main and shared for the process lifetime

pub struct AppState {
    pub upstream: Upstream,
    pub cache: EphemeralCache<Value>, // cache key -> upstream JSON
    pub limiters: Limiters,           // one limiter per endpoint class
}
