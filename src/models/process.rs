use serde::{Deserialize, Serialize};

use crate::models::socket::{Protocol, SocketRecord};

/// Sockets owned by one process, built fresh on every scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConnectionInfo {
    pub pid: u32,
    pub name: String,
    pub cmdline: String,
    pub tcp_count: usize,
    pub udp_count: usize,
    pub total_count: usize,
    pub sockets: Vec<SocketRecord>,
}

impl ProcessConnectionInfo {
    pub fn new(pid: u32, name: String, cmdline: String) -> Self {
        Self {
            pid,
            name,
            cmdline,
            tcp_count: 0,
            udp_count: 0,
            total_count: 0,
            sockets: Vec::new(),
        }
    }

    /// Attach a socket and keep the counters in step
    pub fn push_socket(&mut self, socket: SocketRecord) {
        match socket.protocol {
            Protocol::Tcp => self.tcp_count += 1,
            Protocol::Udp => self.udp_count += 1,
        }
        self.total_count += 1;
        self.sockets.push(socket);
    }
}
