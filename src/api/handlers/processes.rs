use actix_web::{web, Error, HttpResponse};
use serde::Serialize;

use crate::api::AppState;
use crate::models::process::ProcessConnectionInfo;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessesResponse {
    processes: Vec<ProcessConnectionInfo>,
    top_processes: Vec<ProcessConnectionInfo>,
}

/// Socket-owning processes and the busiest of them
pub async fn get_processes(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let telemetry = state.telemetry.clone();
    let (processes, top_processes) = web::block(move || telemetry.processes()).await?;

    Ok(HttpResponse::Ok().json(ProcessesResponse {
        processes,
        top_processes,
    }))
}
