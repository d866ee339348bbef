use async_trait::async_trait;
use log::*;
use service::{config::Config, logging::Logger, AppState};
use sse::{ConnectionId, DisconnectHandler};
use std::sync::Arc;

mod demo;

/// Logs every client that leaves.
struct LogDisconnects;

#[async_trait]
impl DisconnectHandler for LogDisconnects {
    async fn on_disconnect(&self, connection_id: ConnectionId) {
        info!("Client disconnected from SSE connection {connection_id}");
    }
}

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
    }

    info!("Starting up SSE broker...");

    let sse_server = match service::init_sse_server(&config) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("Invalid SSE server configuration: {e}");
            std::process::exit(1);
        }
    };
    sse_server.set_disconnect_handler(Arc::new(LogDisconnects));

    if let Some(period) = config.demo_broadcast_interval() {
        info!("Broadcasting demo events every {}s", period.as_secs());
        demo::spawn_broadcaster(Arc::clone(&sse_server), period);
    }

    let app_state = AppState::new(config, &sse_server);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped with error: {e}");
        std::process::exit(1);
    }

    info!("SSE broker shut down");
}
