use config::Config;
use log::info;
use sse::Server;
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Builds the SSE server from configuration: heartbeat interval and custom headers.
pub fn init_sse_server(config: &Config) -> Result<Server, sse::Error> {
    info!(
        "SSE server config: heartbeat_interval={}s, custom_headers={}",
        config.heartbeat_interval_secs,
        config.custom_headers.len(),
    );

    let server = Server::new();
    server.set_heartbeat_interval(config.heartbeat_interval());
    server.set_custom_headers(config.custom_headers())?;

    Ok(server)
}

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub sse_server: Arc<Server>,
    pub config: Config,
}

impl AppState {
    pub fn new(app_config: Config, sse_server: &Arc<Server>) -> Self {
        Self {
            sse_server: Arc::clone(sse_server),
            config: app_config,
        }
    }
}
