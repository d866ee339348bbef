use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use log::*;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

pub use error::{Error, Result};
pub use service::AppState;

mod controller;
mod error;
mod params;
pub mod router;
pub mod sse;

/// Binds the configured interface and port and serves until Ctrl-C, then
/// closes every open SSE stream so the graceful shutdown can complete.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let host = app_state.config.interface();
    let port = app_state.config.port;
    let listen_addr = format!("{host}:{port}");

    info!("Server starting... listening for connections on http://{listen_addr}");

    let listener = TcpListener::bind(&listen_addr).await?;
    let sse_server = Arc::clone(&app_state.sse_server);
    let cors_layer = cors_layer(&app_state.config.allowed_origins);

    axum::serve(listener, router::define_routes(app_state).layer(cors_layer))
        .with_graceful_shutdown(shutdown_signal(sse_server))
        .await
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin:?}: {e}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true)
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(origins)
}

async fn shutdown_signal(sse_server: Arc<::sse::Server>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {e}");
        // Without a signal there is nothing to wait for; keep serving.
        std::future::pending::<()>().await;
    }

    info!("Shutdown signal received, closing SSE connections");
    sse_server.close();
}
