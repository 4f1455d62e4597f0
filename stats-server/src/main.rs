//! Hierarchical stats engine HTTP server (`spec.md` §6 expansion).
//!
//! Wires [`stats_core::StatsEngine`] to an axum router and drives
//! `global_calc`/`purge` housekeeping on a timer, grounded on
//! `ferrex-server`'s `main.rs` bootstrap.

mod infra;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use stats_core::StatsEngine;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use infra::app_state::AppState;
use infra::config::{Args, ConfigWarnings};

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loaded = infra::config::loader_for(args.config.as_deref()).load()?;
    let mut config = loaded.config;
    let mut warnings = loaded.warnings;
    args.apply(&mut config, &mut warnings);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stats_core=debug,stats_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    log_warnings(&warnings);

    let engine = StatsEngine::standalone();
    let now = now_unix();
    engine.initialize(now, config.build.as_deref());
    engine.global(&config.identity, now);

    let state = AppState::new(Arc::clone(&engine), Arc::new(config.clone()));
    let app = build_router(state);

    spawn_housekeeping(Arc::clone(&engine), &config);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "stats-server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(engine))
        .await?;

    Ok(())
}

fn log_warnings(warnings: &ConfigWarnings) {
    for warning in warnings.iter() {
        warn!("{warning}");
    }
}

fn build_router(state: AppState) -> Router {
    routes::router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn spawn_housekeeping(engine: Arc<StatsEngine>, config: &infra::config::ServerConfig) {
    let global_calc_engine = Arc::clone(&engine);
    let global_calc_interval = config.global_calc_interval_secs;
    let shutdown = engine.shutdown_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(global_calc_interval));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    global_calc_engine.global_calc(&stats_core::NullConnectionCounters, now_unix());
                }
            }
        }
    });

    let purge_engine = Arc::clone(&engine);
    let purge_interval = config.purge_interval_secs;
    let source_expiry = config.source_expiry_secs;
    let shutdown = purge_engine.shutdown_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(purge_interval));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let now = now_unix();
                    purge_engine.purge(now - source_expiry, now);
                }
            }
        }
    });
}

async fn shutdown_signal(engine: Arc<StatsEngine>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    engine.shutdown();
    engine.clients_wakeup();
}
