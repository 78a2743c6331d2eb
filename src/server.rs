//! HTTP surface of the relay: WebSocket endpoints, diagnostics and the
//! static demo page.

use std::path::Path;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app_state::AppState;
use crate::config::Config;
use crate::error::RelayError;
use crate::registry::ClientInfo;
use crate::socket::{root_handler, ws_handler};

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    clients: usize,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        clients: state.registry().len().await,
    })
}

async fn clients(State(state): State<AppState>) -> Json<Vec<ClientInfo>> {
    Json(state.registry().clients().await)
}

pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/clients", get(clients))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<(), RelayError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn run(config: Config) -> Result<(), RelayError> {
    let state = AppState::new(config.sender_policy());
    let app = build_router(state, &config.static_dir);

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr).await?;
    info!("signaling relay listening on ws://{}", listener.local_addr()?);
    info!("serving static files from {}", config.static_dir.display());

    serve(listener, app, shutdown_signal()).await?;
    info!("signaling relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
