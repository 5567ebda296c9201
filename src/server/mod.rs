//! HTTP API over the fetchers.

mod handlers;
mod state;

pub use state::AppState;

use crate::finder::Finder;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn build_router(finder: Arc<Finder>) -> Router {
    let state = Arc::new(AppState { finder });

    Router::new()
        .route("/api/hospitals", get(handlers::hospitals))
        .route("/api/plans", get(handlers::plans))
        .route("/api/region", get(handlers::region))
        .route("/api/callbacks/{key}", post(handlers::deliver_callback))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn start(finder: Arc<Finder>, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(finder);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(addr = %listener.local_addr()?, "healthfinder API listening");
    axum::serve(listener, app).await
}
