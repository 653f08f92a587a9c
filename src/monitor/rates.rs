use log::{debug, trace, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::models::interface::{InterfaceCategory, InterfaceSample};
use crate::utils::error::{AppError, AppResult};

const LOOPBACK: &str = "lo";
const DOCKER_PREFIXES: &[&str] = &["docker", "br-", "veth"];
const VIRTUAL_PREFIXES: &[&str] = &["virbr", "vnet", "vmnet", "vboxnet", "lxcbr", "lxdbr"];
const VPN_PREFIXES: &[&str] = &["tun", "tap", "wg", "ppp", "ipsec", "tailscale", "zt"];
const WIRELESS_PREFIXES: &[&str] = &["wlan", "wlp", "wlx", "wifi", "ath"];
const ETHERNET_PREFIXES: &[&str] = &["eth", "enp", "eno", "ens", "enx", "em"];

/// Map an interface name to its category.
///
/// Rules are tried in order; the first hit wins.
pub fn categorize(name: &str) -> InterfaceCategory {
    let starts_with_any = |prefixes: &[&str]| prefixes.iter().any(|p| name.starts_with(p));

    if name == LOOPBACK {
        InterfaceCategory::Loopback
    } else if name == "docker0" || starts_with_any(DOCKER_PREFIXES) {
        InterfaceCategory::Docker
    } else if starts_with_any(VIRTUAL_PREFIXES) {
        InterfaceCategory::Virtual
    } else if starts_with_any(VPN_PREFIXES) {
        InterfaceCategory::Vpn
    } else if starts_with_any(WIRELESS_PREFIXES) {
        InterfaceCategory::Wireless
    } else if starts_with_any(ETHERNET_PREFIXES) {
        InterfaceCategory::Ethernet
    } else if name.starts_with("br") || name.contains("bridge") {
        InterfaceCategory::Bridge
    } else {
        InterfaceCategory::Other
    }
}

/// Sort by category priority, then by name
pub fn sort_interfaces(samples: &mut [InterfaceSample]) {
    samples.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));
}

/// Raw cumulative counters of one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Parse the per-interface counter table (`net/dev`).
///
/// Two header lines are skipped. Rows that do not carry at least the receive
/// and transmit byte columns are ignored.
pub fn parse_net_dev(content: &str) -> Vec<InterfaceCounters> {
    content
        .lines()
        .skip(2)
        .filter_map(|line| {
            // Large counters can run into the colon, so split there first
            let (name, rest) = line.split_once(':')?;
            let fields: Vec<&str> = rest.split_whitespace().collect();
            if fields.len() < 9 {
                trace!("Skipping short net/dev row: {}", line.trim());
                return None;
            }
            Some(InterfaceCounters {
                name: name.trim().to_string(),
                rx_bytes: fields[0].parse().ok()?,
                tx_bytes: fields[8].parse().ok()?,
            })
        })
        .collect()
}

/// Read the counter table under `proc_root`
pub fn read_counters(proc_root: &Path) -> AppResult<Vec<InterfaceCounters>> {
    let path = proc_root.join("net").join("dev");
    let content = fs::read_to_string(&path).map_err(|e| AppError::io_at(&path, e))?;
    if content.lines().count() < 2 {
        return Err(AppError::Parse(format!("{} is missing its header", path.display())));
    }
    Ok(parse_net_dev(&content))
}

/// Last observation of an interface
#[derive(Debug, Clone)]
struct PriorSample {
    rx_bytes: u64,
    tx_bytes: u64,
    at: Instant,
    seen_tick: u64,
}

/// Derives per-interface throughput from cumulative kernel counters.
///
/// Keeps the previous observation of every interface. Entries for
/// interfaces that stop showing up are evicted after `max_idle_ticks`
/// sampling ticks.
#[derive(Debug)]
pub struct RateSampler {
    proc_root: PathBuf,
    prior: HashMap<String, PriorSample>,
    tick: u64,
    max_idle_ticks: u64,
}

impl RateSampler {
    pub fn new(proc_root: impl Into<PathBuf>, max_idle_ticks: u64) -> Self {
        Self {
            proc_root: proc_root.into(),
            prior: HashMap::new(),
            tick: 0,
            max_idle_ticks,
        }
    }

    /// Read the counter table and compute rates for every interface present.
    ///
    /// An unreadable table yields an empty list.
    pub fn sample(&mut self) -> Vec<InterfaceSample> {
        let counters = match read_counters(&self.proc_root) {
            Ok(counters) => counters,
            Err(e) => {
                warn!("Interface counters unavailable: {}", e);
                Vec::new()
            }
        };
        self.sample_counters(counters, Instant::now())
    }

    /// Compute rates from counters observed at `now`
    pub fn sample_counters(
        &mut self,
        counters: Vec<InterfaceCounters>,
        now: Instant,
    ) -> Vec<InterfaceSample> {
        self.tick += 1;

        let mut samples: Vec<InterfaceSample> = counters
            .into_iter()
            .map(|counter| {
                let (rx_speed, tx_speed) = match self.prior.get(&counter.name) {
                    Some(prev) => {
                        let elapsed = now.saturating_duration_since(prev.at).as_secs_f64();
                        if elapsed > 0.0 {
                            (
                                rate(prev.rx_bytes, counter.rx_bytes, elapsed),
                                rate(prev.tx_bytes, counter.tx_bytes, elapsed),
                            )
                        } else {
                            (0.0, 0.0)
                        }
                    }
                    None => (0.0, 0.0),
                };

                // Stored even when elapsed was not positive so a clock hiccup heals next tick
                self.prior.insert(
                    counter.name.clone(),
                    PriorSample {
                        rx_bytes: counter.rx_bytes,
                        tx_bytes: counter.tx_bytes,
                        at: now,
                        seen_tick: self.tick,
                    },
                );

                InterfaceSample {
                    category: categorize(&counter.name),
                    name: counter.name,
                    rx_bytes_cumulative: counter.rx_bytes,
                    tx_bytes_cumulative: counter.tx_bytes,
                    rx_speed,
                    tx_speed,
                }
            })
            .collect();

        self.evict_idle();
        sort_interfaces(&mut samples);
        samples
    }

    /// Interfaces currently tracked, including ones not seen this tick
    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.prior.len()
    }

    fn evict_idle(&mut self) {
        let tick = self.tick;
        let max_idle = self.max_idle_ticks;
        let before = self.prior.len();
        self.prior.retain(|_, prev| tick - prev.seen_tick <= max_idle);
        let evicted = before - self.prior.len();
        if evicted > 0 {
            debug!("Evicted {} vanished interface(s) from rate history", evicted);
        }
    }
}

/// Non-negative byte rate; a counter that went backwards reads as idle
fn rate(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    (current.saturating_sub(previous) as f64 / elapsed_secs).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn counters(name: &str, rx: u64, tx: u64) -> InterfaceCounters {
        InterfaceCounters {
            name: name.to_string(),
            rx_bytes: rx,
            tx_bytes: tx,
        }
    }

    #[test]
    fn categorize_known_names() {
        assert_eq!(categorize("eth0"), InterfaceCategory::Ethernet);
        assert_eq!(categorize("enp3s0"), InterfaceCategory::Ethernet);
        assert_eq!(categorize("lo"), InterfaceCategory::Loopback);
        assert_eq!(categorize("docker0"), InterfaceCategory::Docker);
        assert_eq!(categorize("wlan0"), InterfaceCategory::Wireless);
        assert_eq!(categorize("veth1234"), InterfaceCategory::Docker);
        assert_eq!(categorize("br-5f2a"), InterfaceCategory::Docker);
        assert_eq!(categorize("virbr0"), InterfaceCategory::Virtual);
        assert_eq!(categorize("wg0"), InterfaceCategory::Vpn);
        assert_eq!(categorize("br0"), InterfaceCategory::Bridge);
        assert_eq!(categorize("foo99"), InterfaceCategory::Other);
    }

    #[test]
    fn sorts_by_category_then_name() {
        let mut sampler = RateSampler::new("/nonexistent", 60);
        let samples = sampler.sample_counters(
            vec![
                counters("wlan0", 0, 0),
                counters("eth1", 0, 0),
                counters("lo", 0, 0),
                counters("docker0", 0, 0),
                counters("eth0", 0, 0),
            ],
            Instant::now(),
        );
        let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["eth0", "eth1", "wlan0", "docker0", "lo"]);
    }

    #[test]
    fn first_sample_is_zero() {
        let mut sampler = RateSampler::new("/nonexistent", 60);
        let samples = sampler.sample_counters(vec![counters("eth0", 5_000, 9_000)], Instant::now());
        assert_eq!(samples[0].rx_speed, 0.0);
        assert_eq!(samples[0].tx_speed, 0.0);
        assert_eq!(samples[0].rx_bytes_cumulative, 5_000);
    }

    #[test]
    fn computes_rate_over_elapsed_time() {
        let mut sampler = RateSampler::new("/nonexistent", 60);
        let start = Instant::now();
        sampler.sample_counters(vec![counters("eth0", 1_000, 2_000)], start);
        let samples = sampler.sample_counters(
            vec![counters("eth0", 3_000, 2_500)],
            start + Duration::from_secs(2),
        );
        assert_eq!(samples[0].rx_speed, 1_000.0);
        assert_eq!(samples[0].tx_speed, 250.0);
    }

    #[test]
    fn decreasing_counter_never_goes_negative() {
        let mut sampler = RateSampler::new("/nonexistent", 60);
        let start = Instant::now();
        sampler.sample_counters(vec![counters("eth0", 10_000, 10_000)], start);
        let samples = sampler.sample_counters(
            vec![counters("eth0", 100, 20_000)],
            start + Duration::from_secs(1),
        );
        assert_eq!(samples[0].rx_speed, 0.0);
        assert_eq!(samples[0].tx_speed, 10_000.0);
    }

    #[test]
    fn zero_elapsed_yields_zero_and_still_updates_prior() {
        let mut sampler = RateSampler::new("/nonexistent", 60);
        let start = Instant::now();
        sampler.sample_counters(vec![counters("eth0", 0, 0)], start);
        let same = sampler.sample_counters(vec![counters("eth0", 500, 500)], start);
        assert_eq!(same[0].rx_speed, 0.0);

        let next = sampler.sample_counters(
            vec![counters("eth0", 1_500, 500)],
            start + Duration::from_secs(1),
        );
        // Baseline moved to the 500-byte observation
        assert_eq!(next[0].rx_speed, 1_000.0);
    }

    #[test]
    fn vanished_interfaces_are_dropped_then_evicted() {
        let mut sampler = RateSampler::new("/nonexistent", 2);
        let start = Instant::now();
        sampler.sample_counters(vec![counters("eth0", 0, 0), counters("usb0", 0, 0)], start);

        for i in 1..=2 {
            let at = start + Duration::from_secs(i);
            let out = sampler.sample_counters(vec![counters("eth0", 0, 0)], at);
            assert_eq!(out.len(), 1);
        }
        assert_eq!(sampler.tracked(), 2);

        sampler.sample_counters(vec![counters("eth0", 0, 0)], start + Duration::from_secs(3));
        assert_eq!(sampler.tracked(), 1);
    }

    #[test]
    fn parses_net_dev_table() {
        let table = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  123456     100    0    0    0     0          0         0   123456     100    0    0    0     0       0          0
  eth0:98765432101 5000    0    0    0     0          0         0  4242      20    0    0    0     0       0          0
 bogus: 1 2 3
";
        let parsed = parse_net_dev(table);
        assert_eq!(
            parsed,
            vec![counters("lo", 123_456, 123_456), counters("eth0", 98_765_432_101, 4_242)]
        );
    }

    #[test]
    fn unreadable_table_degrades_to_empty() {
        let mut sampler = RateSampler::new("/definitely/not/proc", 60);
        assert!(sampler.sample().is_empty());
    }

    #[test]
    fn reads_counters_from_fixture_root() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("net")).unwrap();
        fs::write(
            root.path().join("net/dev"),
            "h1\nh2\n  eth0: 10 1 0 0 0 0 0 0 20 1 0 0 0 0 0 0\n",
        )
        .unwrap();

        let mut sampler = RateSampler::new(root.path(), 60);
        let samples = sampler.sample();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].tx_bytes_cumulative, 20);
    }

    #[test]
    fn read_counters_reports_io_and_truncation() {
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(read_counters(root.path()), Err(AppError::Io(_))));

        fs::create_dir_all(root.path().join("net")).unwrap();
        fs::write(root.path().join("net/dev"), "").unwrap();
        assert!(matches!(read_counters(root.path()), Err(AppError::Parse(_))));
    }
}
