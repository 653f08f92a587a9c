//! Kernel connection tables (`net/tcp`, `net/udp` and their IPv6 twins).
//!
//! Each row carries `local:port remote:port state ... inode`, with addresses
//! as hex dumps of the kernel's in-memory (little-endian) words.

use log::{trace, warn};
use std::collections::HashMap;
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use crate::models::socket::{ConnectionId, Protocol, SocketRecord};
use crate::utils::error::{AppError, AppResult};

/// State reported for connectionless sockets
pub const UDP_STATE: &str = "STATELESS";

/// Column holding the socket inode
const INODE_FIELD: usize = 9;

/// Map a two-digit TCP state code to its name; unknown codes pass through
pub fn tcp_state_name(code: &str) -> String {
    let name = match code.to_ascii_uppercase().as_str() {
        "01" => "ESTABLISHED",
        "02" => "SYN_SENT",
        "03" => "SYN_RECV",
        "04" => "FIN_WAIT1",
        "05" => "FIN_WAIT2",
        "06" => "TIME_WAIT",
        "07" => "CLOSE",
        "08" => "CLOSE_WAIT",
        "09" => "LAST_ACK",
        "0A" => "LISTEN",
        "0B" => "CLOSING",
        _ => return code.to_string(),
    };
    name.to_string()
}

/// Decode an 8-digit little-endian hex IPv4 address
pub fn parse_hex_ipv4(hex: &str) -> Option<Ipv4Addr> {
    if hex.len() != 8 {
        return None;
    }
    let raw = u32::from_str_radix(hex, 16).ok()?;
    Some(Ipv4Addr::from(raw.to_le_bytes()))
}

/// Decode a 32-digit IPv6 address stored as four little-endian words
pub fn parse_hex_ipv6(hex: &str) -> Option<Ipv6Addr> {
    if hex.len() != 32 || !hex.is_ascii() {
        return None;
    }
    let mut octets = [0u8; 16];
    for (i, chunk) in octets.chunks_mut(4).enumerate() {
        let word = u32::from_str_radix(&hex[i * 8..i * 8 + 8], 16).ok()?;
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    Some(Ipv6Addr::from(octets))
}

/// Split `ADDR:PORT` and decode both halves
fn parse_endpoint(field: &str, ip_version: u8) -> Option<(String, u16)> {
    let (addr, port) = field.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;
    let addr = match ip_version {
        4 => parse_hex_ipv4(addr)?.to_string(),
        _ => parse_hex_ipv6(addr)?.to_string(),
    };
    Some((addr, port))
}

/// Parse one data row; `None` for malformed rows and rows without an owner
pub fn parse_row(line: &str, protocol: Protocol, ip_version: u8) -> Option<SocketRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() <= INODE_FIELD {
        return None;
    }

    let (local_addr, local_port) = parse_endpoint(fields[1], ip_version)?;
    let (remote_addr, remote_port) = parse_endpoint(fields[2], ip_version)?;
    let connection_id: ConnectionId = fields[INODE_FIELD].parse().ok()?;
    // Inode 0: the socket has no owning handle (yet)
    if connection_id == 0 {
        return None;
    }

    let state = match protocol {
        Protocol::Tcp => tcp_state_name(fields[3]),
        Protocol::Udp => UDP_STATE.to_string(),
    };

    Some(SocketRecord {
        protocol,
        ip_version,
        local_addr,
        local_port,
        remote_addr,
        remote_port,
        state,
        connection_id,
    })
}

/// Parse a whole table, skipping its header line
pub fn parse_table(content: &str, protocol: Protocol, ip_version: u8) -> Vec<SocketRecord> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parsed = parse_row(line, protocol, ip_version);
            if parsed.is_none() {
                trace!("Skipping {} row: {}", protocol, line.trim());
            }
            parsed
        })
        .collect()
}

/// Reader for the kernel connection tables under one proc root
#[derive(Debug, Clone)]
pub struct SocketTable {
    proc_root: PathBuf,
}

impl SocketTable {
    const TABLES: [(&'static str, Protocol, u8); 4] = [
        ("tcp", Protocol::Tcp, 4),
        ("tcp6", Protocol::Tcp, 6),
        ("udp", Protocol::Udp, 4),
        ("udp6", Protocol::Udp, 6),
    ];

    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Every owned socket keyed by connection id.
    ///
    /// A table that cannot be read contributes nothing; the others still load.
    pub fn read_all(&self) -> HashMap<ConnectionId, SocketRecord> {
        let mut sockets = HashMap::new();
        for (table, protocol, ip_version) in Self::TABLES {
            match self.read_table(table) {
                Ok(content) => {
                    for record in parse_table(&content, protocol, ip_version) {
                        sockets.insert(record.connection_id, record);
                    }
                }
                // Hosts without IPv6 simply lack the *6 tables
                Err(e) if ip_version == 6 => trace!("{}", e),
                Err(e) => warn!("Connection table unavailable: {}", e),
            }
        }
        sockets
    }

    fn read_table(&self, table: &str) -> AppResult<String> {
        let path = self.proc_root.join("net").join(table);
        fs::read_to_string(&path).map_err(|e| AppError::io_at(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_TABLE: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:0CEA 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 31337 1 0000000000000000 100 0 0 10 0
   1: 0F02000A:C350 2E8A3AD8:01BB 01 00000000:00000000 02:000001A4 00000000  1000        0 42424 2 0000000000000000 20 4 30 10 -1
   2: 0F02000A:C351 2E8A3AD8:01BB 06 00000000:00000000 03:00000000 00000000     0        0 0 3 0000000000000000
   3: garbage
   4: ZZZZZZZZ:0050 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 777 1
";

    #[test]
    fn maps_tcp_state_codes() {
        assert_eq!(tcp_state_name("0A"), "LISTEN");
        assert_eq!(tcp_state_name("01"), "ESTABLISHED");
        assert_eq!(tcp_state_name("0b"), "CLOSING");
        assert_eq!(tcp_state_name("FF"), "FF");
    }

    #[test]
    fn decodes_little_endian_ipv4() {
        assert_eq!(parse_hex_ipv4("0100007F"), Some(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(parse_hex_ipv4("0F02000A"), Some(Ipv4Addr::new(10, 0, 2, 15)));
        assert_eq!(parse_hex_ipv4("0100007"), None);
        assert_eq!(parse_hex_ipv4("XYZ0007F"), None);
    }

    #[test]
    fn decodes_ipv6_words() {
        assert_eq!(
            parse_hex_ipv6("00000000000000000000000001000000"),
            Some(Ipv6Addr::LOCALHOST)
        );
        assert_eq!(
            parse_hex_ipv6("B80D0120000000000000000001000000"),
            Some("2001:db8::1".parse().unwrap())
        );
    }

    #[test]
    fn parses_tcp_rows_and_skips_bad_ones() {
        let records = parse_table(TCP_TABLE, Protocol::Tcp, 4);
        assert_eq!(records.len(), 2);

        let listener = &records[0];
        assert_eq!(listener.local_addr, "127.0.0.1");
        assert_eq!(listener.local_port, 3306);
        assert_eq!(listener.state, "LISTEN");
        assert_eq!(listener.connection_id, 31337);

        let established = &records[1];
        assert_eq!(established.remote_addr, "216.58.138.46");
        assert_eq!(established.remote_port, 443);
        assert_eq!(established.state, "ESTABLISHED");
    }

    #[test]
    fn unknown_state_survives_next_to_malformed_rows() {
        let table = "header\n\
                     0: 0100007F:0050 00000000:0000 FF 00000000:00000000 00:00000000 00000000 0 0 777 1\n\
                     1: garbage\n\
                     2: 0100007F:0051 00000000:0000 0A 00000000:00000000 00:00000000 00000000 0 0 778 1\n";
        let records = parse_table(table, Protocol::Tcp, 4);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].state, "FF");
        assert_eq!(records[0].connection_id, 777);
        assert_eq!(records[1].state, "LISTEN");
    }

    #[test]
    fn udp_rows_use_stateless_sentinel() {
        let table = "header\n  5: 00000000:0044 00000000:0000 07 \
                     00000000:00000000 00:00000000 00000000 0 0 555 2\n";
        let records = parse_table(table, Protocol::Udp, 4);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, UDP_STATE);
        assert_eq!(records[0].local_port, 68);
        assert_eq!(records[0].protocol, Protocol::Udp);
    }

    #[test]
    fn read_all_tolerates_missing_tables() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("net")).unwrap();
        fs::write(root.path().join("net/tcp"), TCP_TABLE).unwrap();

        let sockets = SocketTable::new(root.path()).read_all();
        assert_eq!(sockets.len(), 2);
        assert!(sockets.contains_key(&31337));
        assert!(sockets.contains_key(&42424));
    }

    #[test]
    fn read_all_on_absent_root_is_empty() {
        assert!(SocketTable::new("/no/such/proc").read_all().is_empty());
    }
}
