use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse kind of a network interface, derived from its name.
///
/// Declaration order is the display priority used when sorting interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceCategory {
    Ethernet,
    Wireless,
    Vpn,
    Docker,
    Bridge,
    Virtual,
    Loopback,
    Other,
}

impl InterfaceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceCategory::Ethernet => "ethernet",
            InterfaceCategory::Wireless => "wireless",
            InterfaceCategory::Vpn => "vpn",
            InterfaceCategory::Docker => "docker",
            InterfaceCategory::Bridge => "bridge",
            InterfaceCategory::Virtual => "virtual",
            InterfaceCategory::Loopback => "loopback",
            InterfaceCategory::Other => "other",
        }
    }
}

impl fmt::Display for InterfaceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Throughput of one interface at one sampling tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceSample {
    /// Kernel interface name
    pub name: String,

    /// Category derived from the name
    pub category: InterfaceCategory,

    /// Bytes received since the interface came up
    pub rx_bytes_cumulative: u64,

    /// Bytes transmitted since the interface came up
    pub tx_bytes_cumulative: u64,

    /// Receive rate in bytes per second, never negative
    pub rx_speed: f64,

    /// Transmit rate in bytes per second, never negative
    pub tx_speed: f64,
}

/// Slow-changing metadata of an interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDetails {
    pub mac: String,
    pub mtu: u32,
    pub state: String,
    pub speed_mbps: Option<u32>,
    pub duplex: Option<String>,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
}

impl InterfaceDetails {
    /// Details reported when nothing could be read
    pub fn unknown() -> Self {
        Self {
            mac: "unknown".to_string(),
            mtu: 0,
            state: "unknown".to_string(),
            speed_mbps: None,
            duplex: None,
            ipv4: Vec::new(),
            ipv6: Vec::new(),
        }
    }
}

/// One row of the snapshot's `interfaces` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceStatus {
    #[serde(flatten)]
    pub sample: InterfaceSample,

    pub details: InterfaceDetails,
}
