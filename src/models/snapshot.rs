use serde::{Deserialize, Serialize};

use crate::models::bandwidth::BandwidthRecord;
use crate::models::interface::InterfaceStatus;
use crate::models::process::ProcessConnectionInfo;

/// One fully assembled aggregate of every producer, the unit of broadcast.
///
/// Field names are the external wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub interfaces: Vec<InterfaceStatus>,
    pub processes: Vec<ProcessConnectionInfo>,
    pub top_processes: Vec<ProcessConnectionInfo>,
    pub bandwidth: Vec<BandwidthRecord>,
    pub bandwidth_enabled: bool,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Snapshot {
    #[cfg(test)]
    pub fn empty() -> Self {
        Self {
            interfaces: Vec::new(),
            processes: Vec::new(),
            top_processes: Vec::new(),
            bandwidth: Vec::new(),
            bandwidth_enabled: false,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
