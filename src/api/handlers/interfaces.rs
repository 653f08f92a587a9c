use actix_web::{web, Error, HttpResponse};
use log::info;
use serde::Serialize;

use crate::api::AppState;

/// Response for listing interfaces
#[derive(Serialize)]
struct InterfacesResponse {
    interfaces: Vec<String>,
}

/// List available network interfaces
pub async fn list_interfaces(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let telemetry = state.telemetry.clone();
    let interfaces = web::block(move || telemetry.interface_names()).await??;

    Ok(HttpResponse::Ok().json(InterfacesResponse { interfaces }))
}

/// Cached details of one interface
pub async fn get_interface_details(
    state: web::Data<AppState>,
    name: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let telemetry = state.telemetry.clone();
    let name = name.into_inner();
    let details = web::block(move || telemetry.interface_details(&name)).await??;

    Ok(HttpResponse::Ok().json(details))
}

/// Drop cached details so the next lookup re-reads them
pub async fn invalidate_details(state: web::Data<AppState>) -> HttpResponse {
    state.telemetry.invalidate_details();
    info!("Interface details invalidated on request");

    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": "Interface details cache invalidated"
    }))
}
