use serde::{Deserialize, Serialize};
use std::fmt;

/// Kernel-assigned identifier tying a connection-table row to the open
/// file handle that owns it (the socket inode)
pub type ConnectionId = u64;

/// Transport protocol of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// One normalized row of a kernel connection table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketRecord {
    pub protocol: Protocol,

    /// 4 or 6
    pub ip_version: u8,

    pub local_addr: String,
    pub local_port: u16,
    pub remote_addr: String,
    pub remote_port: u16,

    /// TCP state name, the raw code when unknown, or the UDP sentinel
    pub state: String,

    pub connection_id: ConnectionId,
}
