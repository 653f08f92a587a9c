mod api;
mod models;
mod monitor;
mod utils;

use actix_web::{web, App, HttpServer};
use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::{routes, AppState};
use crate::models::config::AppConfig;
use crate::monitor::collector::Telemetry;
use crate::monitor::hub::BroadcastHub;
use crate::utils::logging;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Network telemetry agent with REST and WebSocket API")]
struct Args {
    /// Address the API server binds to
    #[clap(long, default_value = "127.0.0.1")]
    host: String,

    /// Port for the API server
    #[clap(short, long, default_value = "3000")]
    port: u16,

    /// Snapshot broadcast interval in milliseconds
    #[clap(long, default_value = "1000")]
    broadcast_interval_ms: u64,

    /// Bandwidth cache maintenance interval in seconds
    #[clap(long, default_value = "30")]
    maintenance_interval_secs: u64,

    /// How long interface details stay cached, in seconds
    #[clap(long, default_value = "300")]
    details_ttl_secs: u64,

    /// Process-name cache cap of the bandwidth sampler
    #[clap(long, default_value = "500")]
    name_cache_cap: usize,

    /// Number of processes reported as top processes
    #[clap(long, default_value = "10")]
    top_processes: usize,

    /// Ticks an interface may go unseen before its prior sample is dropped
    #[clap(long, default_value = "60")]
    prior_sample_max_idle_ticks: u64,

    /// Per-process bandwidth sampler executable
    #[clap(long, default_value = "nethogs")]
    sampler_path: String,

    /// Do not start the bandwidth sampler at boot
    #[clap(long)]
    no_bandwidth: bool,

    /// Root of the process pseudo-filesystem
    #[clap(long, default_value = "/proc")]
    proc_root: PathBuf,

    /// Root of the sysfs pseudo-filesystem
    #[clap(long, default_value = "/sys")]
    sys_root: PathBuf,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "info")]
    log_level: String,
}

impl From<Args> for AppConfig {
    fn from(args: Args) -> Self {
        AppConfig {
            host: args.host,
            port: args.port,
            broadcast_interval_ms: args.broadcast_interval_ms,
            maintenance_interval_secs: args.maintenance_interval_secs,
            details_ttl_secs: args.details_ttl_secs,
            name_cache_cap: args.name_cache_cap,
            top_processes: args.top_processes,
            prior_sample_max_idle_ticks: args.prior_sample_max_idle_ticks,
            sampler_path: args.sampler_path,
            bandwidth: !args.no_bandwidth,
            proc_root: args.proc_root,
            sys_root: args.sys_root,
            log_level: args.log_level,
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from(Args::parse());

    // Initialize logger with specified level
    logging::init_logger(logging::get_log_level(&config.log_level));

    info!("Starting netpulse v{}", env!("CARGO_PKG_VERSION"));
    config.validate()?;

    let telemetry = Arc::new(Telemetry::from_config(&config));
    let hub = Arc::new(BroadcastHub::new(telemetry.clone(), config.broadcast_interval()));

    if config.bandwidth {
        if !telemetry.bandwidth().start() {
            warn!("Per-process bandwidth unavailable; continuing without it");
        }
    } else {
        info!("Bandwidth sampler disabled by configuration");
    }

    let broadcast_task = hub.clone().spawn();
    let maintenance_task = telemetry.spawn_maintenance(config.maintenance_interval());

    let bind = (config.host.clone(), config.port);
    let app_state = web::Data::new(AppState {
        telemetry: telemetry.clone(),
        hub: hub.clone(),
        config: config.clone(),
    });

    info!("Starting API server on {}:{}", bind.0, bind.1);

    // Start the HTTP server; returns once a shutdown signal arrives
    let served = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await;

    info!("Shutting down");
    broadcast_task.abort();
    maintenance_task.abort();
    telemetry.bandwidth().stop();

    served?;
    Ok(())
}
