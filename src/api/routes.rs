use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::api::handlers::{
    bandwidth::{get_bandwidth, start_bandwidth, stop_bandwidth},
    interfaces::{get_interface_details, invalidate_details, list_interfaces},
    processes::get_processes,
    status::get_status,
};
use crate::api::websocket::ws_index;

/// Root endpoint to provide information about the API
async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "name": "netpulse",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Network telemetry agent: interface rates, process sockets and per-process bandwidth",
        "endpoints": [
            {
                "path": "/api/ws",
                "method": "GET",
                "description": "WebSocket stream of telemetry snapshots"
            },
            {
                "path": "/api/interfaces",
                "method": "GET",
                "description": "List available network interfaces"
            },
            {
                "path": "/api/interfaces/{name}/details",
                "method": "GET",
                "description": "Address, link and IP details of one interface"
            },
            {
                "path": "/api/interfaces/details/invalidate",
                "method": "POST",
                "description": "Discard cached interface details"
            },
            {
                "path": "/api/processes",
                "method": "GET",
                "description": "Processes with open sockets"
            },
            {
                "path": "/api/bandwidth",
                "method": "GET",
                "description": "Per-process bandwidth"
            },
            {
                "path": "/api/bandwidth/start",
                "method": "POST",
                "description": "Start the bandwidth sampler"
            },
            {
                "path": "/api/bandwidth/stop",
                "method": "POST",
                "description": "Stop the bandwidth sampler"
            },
            {
                "path": "/api/status",
                "method": "GET",
                "description": "Agent status"
            }
        ]
    }))
}

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Root endpoint
        .route("/", web::get().to(index))
        .service(
            web::scope("/api")
                // WebSocket route for real-time updates
                .route("/ws", web::get().to(ws_index))
                .route("/status", web::get().to(get_status))
                .route("/processes", web::get().to(get_processes))
                .service(
                    web::scope("/interfaces")
                        .route("", web::get().to(list_interfaces))
                        .route("/details/invalidate", web::post().to(invalidate_details))
                        .route("/{name}/details", web::get().to(get_interface_details)),
                )
                .service(
                    web::scope("/bandwidth")
                        .route("", web::get().to(get_bandwidth))
                        .route("/start", web::post().to(start_bandwidth))
                        .route("/stop", web::post().to(stop_bandwidth)),
                ),
        );
}
