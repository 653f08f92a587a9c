use log::{debug, info, trace};
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::models::interface::InterfaceDetails;

/// Source of the addresses bound to an interface
pub trait AddressSource: Send {
    fn addresses(&self, name: &str) -> Vec<IpAddr>;
}

/// Address listing through the datalink layer
#[derive(Debug, Default)]
pub struct DatalinkAddresses;

impl AddressSource for DatalinkAddresses {
    fn addresses(&self, name: &str) -> Vec<IpAddr> {
        pnet_datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
            .map(|iface| iface.ips.iter().map(|net| net.ip()).collect())
            .unwrap_or_default()
    }
}

/// TTL cache of interface metadata.
///
/// Expiry is tracked by one timestamp for the whole cache: once it lapses the
/// next lookup refreshes every known interface in a single pass.
pub struct InterfaceDetailsCache {
    sys_root: PathBuf,
    ttl: Duration,
    addresses: Box<dyn AddressSource>,
    entries: HashMap<String, InterfaceDetails>,
    last_refresh: Option<Instant>,
}

impl InterfaceDetailsCache {
    pub fn new(sys_root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self::with_address_source(sys_root, ttl, Box::new(DatalinkAddresses))
    }

    pub fn with_address_source(
        sys_root: impl Into<PathBuf>,
        ttl: Duration,
        addresses: Box<dyn AddressSource>,
    ) -> Self {
        Self {
            sys_root: sys_root.into(),
            ttl,
            addresses,
            entries: HashMap::new(),
            last_refresh: None,
        }
    }

    /// Details for `name`, refreshing the whole cache first if it is stale
    pub fn get(&mut self, name: &str) -> InterfaceDetails {
        if self.is_stale() {
            self.refresh_all(Some(name));
        } else if !self.entries.contains_key(name) {
            let details = self.fetch(name);
            self.entries.insert(name.to_string(), details);
        }

        self.entries
            .get(name)
            .cloned()
            .unwrap_or_else(InterfaceDetails::unknown)
    }

    /// Force a full refresh on the next lookup
    pub fn invalidate(&mut self) {
        info!("Interface details cache invalidated");
        self.last_refresh = None;
    }

    /// Forget interfaces that are no longer present
    pub fn retain(&mut self, present: &[String]) {
        self.entries.retain(|name, _| present.contains(name));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_stale(&self) -> bool {
        match self.last_refresh {
            Some(at) => at.elapsed() >= self.ttl,
            None => true,
        }
    }

    fn refresh_all(&mut self, requested: Option<&str>) {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        if let Some(name) = requested {
            if !self.entries.contains_key(name) {
                names.push(name.to_string());
            }
        }

        debug!("Refreshing interface details for {} interface(s)", names.len());
        for name in names {
            let details = self.fetch(&name);
            self.entries.insert(name, details);
        }
        self.last_refresh = Some(Instant::now());
    }

    fn fetch(&self, name: &str) -> InterfaceDetails {
        let dir = self.sys_root.join("class").join("net").join(name);
        let (ipv4, ipv6) = split_addresses(self.addresses.addresses(name));

        InterfaceDetails {
            mac: read_attr(&dir, "address")
                .filter(|mac| !mac.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            mtu: read_attr(&dir, "mtu").and_then(|v| v.parse().ok()).unwrap_or(0),
            state: read_attr(&dir, "operstate").unwrap_or_else(|| "unknown".to_string()),
            // Drivers without link info report -1 here
            speed_mbps: read_attr(&dir, "speed")
                .and_then(|v| v.parse::<i64>().ok())
                .and_then(|v| u32::try_from(v).ok()),
            duplex: read_attr(&dir, "duplex"),
            ipv4,
            ipv6,
        }
    }
}

fn read_attr(dir: &Path, attr: &str) -> Option<String> {
    match fs::read_to_string(dir.join(attr)) {
        Ok(value) => Some(value.trim().to_string()),
        Err(e) => {
            trace!("{}/{} unreadable: {}", dir.display(), attr, e);
            None
        }
    }
}

/// Split into IPv4 and IPv6 text, dropping IPv6 link-local addresses
fn split_addresses(addresses: Vec<IpAddr>) -> (Vec<String>, Vec<String>) {
    let mut ipv4 = Vec::new();
    let mut ipv6 = Vec::new();
    for addr in addresses {
        match addr {
            IpAddr::V4(v4) => ipv4.push(v4.to_string()),
            IpAddr::V6(v6) if (v6.segments()[0] & 0xffc0) == 0xfe80 => {}
            IpAddr::V6(v6) => ipv6.push(v6.to_string()),
        }
    }
    (ipv4, ipv6)
}
