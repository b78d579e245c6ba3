//! Veil server — swap orchestrator API
//!
//! Responsibilities:
//! - REST API for quoting, starting, and tracking swaps
//! - Admin listing with computed fee metrics
//! - Runs the background sweeper that drives every open swap

mod routes;
mod state;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use state::AppState;
use veil_core::{sweeper, Orchestrator, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let settings = Settings::from_env();
    let listen_addr = settings.listen_addr.clone();

    tracing::info!("Veil server starting...");

    // Registry is restored from disk here, before the sweeper runs.
    let orchestrator = Arc::new(Orchestrator::from_settings(settings)?);
    let state = Arc::new(AppState::new(orchestrator.clone()));

    let _sweeper = sweeper::spawn(orchestrator);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state);

    tracing::info!("Listening on http://{listen_addr}");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
