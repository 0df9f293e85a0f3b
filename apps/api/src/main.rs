mod config;
mod db;
mod dispatch;
mod entitlements;
mod errors;
mod features;
mod models;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::dispatch::gemini::GeminiBackend;
use crate::dispatch::Dispatcher;
use crate::entitlements::store::PgEntitlementStore;
use crate::entitlements::EntitlementGate;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Compass API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.db_max_connections).await?;

    // Entitlement gate over the Postgres store
    let gate = EntitlementGate::new(Arc::new(PgEntitlementStore::new(db)));
    info!("Entitlement gate initialized");

    // Retry-wrapped dispatcher over the Gemini backend
    let dispatcher = Dispatcher::new(Arc::new(GeminiBackend::new(config.gemini_api_key.clone())));
    info!("Completion dispatcher initialized");

    let state = AppState { gate, dispatcher };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
