//! Axum router setup for the depviz server

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{favicon, health_check, missing_package, render_package},
    ServerState,
};

/// Create the axum router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/favicon.ico", get(favicon))
        .route("/", get(missing_package))
        // Everything else is an import path
        .route("/*path", get(render_package))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
