//! Dashboard — Axum JSON control/status API.
//!
//! Stands in for the interactive command layer: bump registry management,
//! notification toggles, reminders and a status summary.
//! Listens on loopback by default; `/api/*` requires a bearer token.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::net::{IpAddr, SocketAddr};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub use routes::{AppState, DashboardState};

/// Bind `bind:port` and serve in a background task until `cancel` fires.
pub async fn spawn_dashboard(
    state: AppState,
    bind: &str,
    port: u16,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let app = build_router(state);
    let ip: IpAddr = bind
        .parse()
        .with_context(|| format!("Invalid dashboard bind address {bind:?}"))?;
    let addr = SocketAddr::new(ip, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard on {addr}"))?;
    info!(%addr, "Dashboard server starting on http://{addr}");

    Ok(tokio::spawn(async move {
        let shutdown = async move { cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            error!(error = %e, "Dashboard server error");
        }
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let api = Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/bumps", get(routes::list_bumps).post(routes::register_bump))
        .route("/api/bumps/run", post(routes::run_bumps))
        .route("/api/bumps/:thread_id", delete(routes::deregister_bump))
        .route("/api/settings", get(routes::get_settings))
        .route("/api/settings/:key", put(routes::put_setting))
        .route("/api/reminders", post(routes::create_reminder))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            routes::require_token,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(api)
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
