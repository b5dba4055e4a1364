//! # docpipe-server: HTTP Service for the Pipeline Rewrite Engine
//!
//! This binary exposes the document-pipeline rewrite pass as a network
//! service, so that a coordinator can submit a pipeline and receive the
//! optimized (or explain-annotated) form.
//!
//! ## Endpoints
//!
//! - `GET  /health`    - Health check
//! - `GET  /stages`    - List registered stage names
//! - `POST /optimize`  - Rewrite a pipeline, return the optimized stage list
//! - `POST /explain`   - Rewrite and return the `_modPaths`-annotated form
//!
//! ## Configuration
//!
//! The server listens on `0.0.0.0:3000`. Logging is controlled by the
//! `RUST_LOG` environment variable (defaults to `docpipe=debug`).

mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("docpipe=debug".parse().unwrap()),
        )
        .init();

    let state = Arc::new(state::AppState::new());

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/stages", get(routes::list_stages))
        .route("/optimize", post(routes::optimize))
        .route("/explain", post(routes::explain))
        .layer(CorsLayer::permissive()) // Allow cross-origin requests (for dev/debug UIs)
        .layer(TraceLayer::new_for_http()) // Log all HTTP requests
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    tracing::info!("docpipe-server listening on http://0.0.0.0:3000");
    axum::serve(listener, app).await.unwrap();
}
