use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod db;
mod metrics;
mod models;
mod services;
mod utils;

use crate::config::AppConfig;
use crate::db::Database;
use crate::services::matching::MatchingEngine;
use crate::services::store::Store;

pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    pub matching_engine: Arc<MatchingEngine>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prediction_market_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    tracing::info!("starting prediction market core v{}", env!("CARGO_PKG_VERSION"));

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;
    tracing::info!("database connected and migrated");

    let metrics_handle = metrics::init_metrics();

    let store = Store::new(db.pool.clone());
    let matching_engine = Arc::new(MatchingEngine::new(
        store.clone(),
        config.taker_fee_bps,
        config.market_mailbox_capacity,
    ));

    match matching_engine.recover().await {
        Ok(count) => tracing::info!(markets = count, "recovered open markets into workers"),
        Err(err) => {
            tracing::error!(error = %err, "failed to recover open markets");
            return Err(err.into());
        }
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        matching_engine,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(move || render_metrics(metrics_handle.clone())))
        .nest("/api/v1", api::routes::create_router(state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn render_metrics(handle: metrics_exporter_prometheus::PrometheusHandle) -> String {
    handle.render()
}
