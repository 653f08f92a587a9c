pub mod handlers;
pub mod routes;
pub mod websocket;

use std::sync::Arc;

use crate::models::config::AppConfig;
use crate::monitor::collector::Telemetry;
use crate::monitor::hub::BroadcastHub;

/// Shared state handed to every handler
pub struct AppState {
    pub telemetry: Arc<Telemetry>,
    pub hub: Arc<BroadcastHub>,
    pub config: AppConfig,
}

#[cfg(test)]
pub(crate) fn test_state(config: &AppConfig) -> AppState {
    let telemetry = Arc::new(crate::monitor::collector::tests::telemetry(config));
    let hub = Arc::new(BroadcastHub::new(telemetry.clone(), config.broadcast_interval()));
    AppState {
        telemetry,
        hub,
        config: config.clone(),
    }
}
