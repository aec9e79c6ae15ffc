//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::get_status))
        .route("/block/{id}", get(handlers::get_block))
        .route("/tx", post(handlers::post_transaction))
        .route("/tx/{hash}", get(handlers::get_transaction))
        .route("/account/{address}", get(handlers::get_balance))
        .with_state(state)
        .layer(cors)
}

/// Bind `addr` and serve the API until the task is cancelled
pub async fn serve(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, create_router(state)).await
}
