use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::error::{AppError, AppResult};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the API server binds to
    pub host: String,

    /// Port for the API server
    pub port: u16,

    /// Cadence of the snapshot broadcast
    pub broadcast_interval_ms: u64,

    /// Cadence of the bandwidth cache maintenance pass
    pub maintenance_interval_secs: u64,

    /// Time-to-live of cached interface details
    pub details_ttl_secs: u64,

    /// Hard cap on the bandwidth sampler's process-name cache
    pub name_cache_cap: usize,

    /// Number of processes in `topProcesses`
    pub top_processes: usize,

    /// Sampling ticks an unseen interface keeps its prior sample
    pub prior_sample_max_idle_ticks: u64,

    /// Per-process bandwidth sampler executable
    pub sampler_path: String,

    /// Whether the bandwidth sampler is started at boot
    pub bandwidth: bool,

    /// Root of the process pseudo-filesystem
    pub proc_root: PathBuf,

    /// Root of the sysfs pseudo-filesystem
    pub sys_root: PathBuf,

    /// Log level (trace, debug, info, warn, error, off)
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            broadcast_interval_ms: 1000,
            maintenance_interval_secs: 30,
            details_ttl_secs: 300,
            name_cache_cap: 500,
            top_processes: 10,
            prior_sample_max_idle_ticks: 60,
            sampler_path: "nethogs".to_string(),
            bandwidth: true,
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.broadcast_interval_ms == 0 {
            return Err(AppError::Config("broadcast interval must be positive".to_string()));
        }
        if self.maintenance_interval_secs == 0 {
            return Err(AppError::Config("maintenance interval must be positive".to_string()));
        }
        if self.name_cache_cap == 0 {
            return Err(AppError::Config("name cache cap must be positive".to_string()));
        }
        if self.sampler_path.trim().is_empty() {
            return Err(AppError::Config("sampler path is empty".to_string()));
        }
        Ok(())
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn details_ttl(&self) -> Duration {
        Duration::from_secs(self.details_ttl_secs)
    }
}
