use serde::{Deserialize, Serialize};

/// Per-process transfer rates reported by the bandwidth sampler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthRecord {
    pub pid: u32,
    pub name: String,
    pub user_or_owner: String,
    pub sent_rate_k_bs: f64,
    pub received_rate_k_bs: f64,
}

impl BandwidthRecord {
    pub fn total_rate(&self) -> f64 {
        self.sent_rate_k_bs + self.received_rate_k_bs
    }

    /// Idle records stay stored but are never surfaced
    pub fn is_active(&self) -> bool {
        self.total_rate() > 0.0
    }
}

/// Response of the bandwidth pull query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthReport {
    pub data: Vec<BandwidthRecord>,
    pub enabled: bool,
}
