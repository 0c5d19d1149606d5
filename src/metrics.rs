use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("blogrolly_requests_total", "Total number of requests").unwrap();
    pub static ref RATE_LIMITED: CounterVec = register_counter_vec!(
        "blogrolly_rate_limited_total",
        "Requests rejected by an admission limiter",
        &["class"]
    )
    .unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("blogrolly_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("blogrolly_cache_misses_total", "Total cache misses").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "blogrolly_upstream_latency_seconds",
        "Upstream request latency in seconds"
    )
    .unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("blogrolly_cache_size", "Current number of items in cache").unwrap();
}
