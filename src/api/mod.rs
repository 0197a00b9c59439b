//! Parking Hub HTTP Layer
//!
//! HTTP surface for the hub, built with Axum.
//!
//! # Endpoints
//!
//! - `GET {ws_path}` - WebSocket upgrade (default `/ws`), Origin checked
//! - `GET /health` - `{"status":"ok","clients":N,...}`
//! - `GET /` - Status page
//!
//! # Example
//!
//! ```rust,ignore
//! use parking_hub::api;
//! use parking_hub::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::resolve(None)?;
//!     api::run(config).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::provider;
use crate::websocket::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let ws_path = state.config.server.ws_path.clone();
    let cors = cors_layer(&state.config.server.cors_origins);

    let shared_state = Arc::new(state);

    Router::new()
        .route(&ws_path, get(websocket_handler))
        .route("/health", get(routes::health::health))
        .route("/", get(routes::index::index))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.iter().any(|o| o.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Start the HTTP server
///
/// On Ctrl+C or SIGTERM the hub is shut down first, closing every WebSocket,
/// then in-flight HTTP requests are drained.
pub async fn serve(state: AppState) -> ApiResult<()> {
    let addr = state.config.server.addr();
    let ws_path = state.config.server.ws_path.clone();
    let hub = Arc::clone(&state.hub);

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Parking hub listening on http://{}", addr);
    tracing::info!("WebSocket endpoint: ws://{}{}", addr, ws_path);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            hub.shutdown().await;
        })
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Parking hub shut down gracefully");
    Ok(())
}

/// Build the provider and hub from configuration and serve until shutdown
pub async fn run(config: Config) -> ApiResult<()> {
    config.validate()?;

    let provider = provider::from_config(&config.provider)?;
    tracing::info!(provider = provider.name(), "Data provider ready");

    match provider.health_check().await {
        Ok(()) => tracing::info!(provider = provider.name(), "Data provider reachable"),
        Err(e) => tracing::warn!(
            provider = provider.name(),
            error = %e,
            "Data provider not reachable, updates will fail until it is"
        ),
    }

    let state = AppState::new(provider, config);
    let hub = Arc::clone(&state.hub);
    let refresh = hub.start_refresh_loop();

    let result = serve(state).await;

    // No-op after a signal; covers a server that stopped on its own
    hub.shutdown().await;
    if let Err(e) = refresh.await {
        tracing::error!(error = %e, "Refresh loop ended abnormally");
    }

    result
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
