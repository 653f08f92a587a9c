use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::api::AppState;
use crate::models::config::AppConfig;
use crate::monitor::bandwidth::SamplerStatus;

/// Response for agent status
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse<'a> {
    subscribers: usize,
    broadcasts: u64,
    bandwidth: SamplerStatus,
    config: &'a AppConfig,
}

/// Get agent status
pub async fn get_status(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(StatusResponse {
        subscribers: state.hub.subscriber_count(),
        broadcasts: state.hub.ticks(),
        bandwidth: state.telemetry.bandwidth().status(),
        config: &state.config,
    })
}
