mod cache;
mod config;
mod error;
mod handlers;
mod metrics;
mod models;
mod rate_limit;
mod state;
mod telemetry;
mod upstream;

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use crate::cache::EphemeralCache;
use crate::config::Args;
use crate::state::AppState;
use crate::upstream::Upstream;

// this is main async function with tokio
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    // parse cli arguments
    let args = Args::parse();
    args.validate()?;

    // creating shared state; it lives for the whole process
    let state = Arc::new(AppState {
        upstream: Upstream::new(
            reqwest::Client::new(),
            &args.upstream,
            args.upstream_key.clone(),
            args.upstream_timeout(),
        ),
        cache: EphemeralCache::new(args.cache_max_size).with_default_ttl(args.cache_ttl_minutes),
        limiters: args.limiters(),
    });

    let app = handlers::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, upstream = %args.upstream, "edge running");
    info!(
        max_size = args.cache_max_size,
        ttl_minutes = args.cache_ttl_minutes,
        "cache configured"
    );
    info!(
        auth = %format!("{}/{}s", args.auth_max, args.auth_window_secs),
        api = %format!("{}/{}s", args.api_max, args.api_window_secs),
        submission = %format!("{}/{}s", args.submission_max, args.submission_window_secs),
        "rate limits configured"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
