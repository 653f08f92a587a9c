use actix_web::{web, Error, HttpResponse};
use log::info;
use serde::Serialize;

use crate::api::AppState;

#[derive(Serialize)]
struct EnabledResponse {
    enabled: bool,
}

/// Current per-process bandwidth
pub async fn get_bandwidth(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let telemetry = state.telemetry.clone();
    let report = web::block(move || telemetry.bandwidth_report()).await?;

    Ok(HttpResponse::Ok().json(report))
}

/// (Re)start the sampler
pub async fn start_bandwidth(state: web::Data<AppState>) -> HttpResponse {
    info!("Bandwidth sampler start requested");
    let enabled = state.telemetry.bandwidth().start();

    HttpResponse::Ok().json(EnabledResponse { enabled })
}

/// Stop the sampler and discard its data
pub async fn stop_bandwidth(state: web::Data<AppState>) -> HttpResponse {
    info!("Bandwidth sampler stop requested");
    let bandwidth = state.telemetry.bandwidth();
    bandwidth.stop();

    HttpResponse::Ok().json(EnabledResponse {
        enabled: bandwidth.is_active(),
    })
}
