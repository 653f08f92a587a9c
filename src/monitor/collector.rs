use log::{debug, error, info};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::models::bandwidth::BandwidthReport;
use crate::models::config::AppConfig;
use crate::models::interface::{InterfaceDetails, InterfaceStatus};
use crate::models::process::ProcessConnectionInfo;
use crate::models::snapshot::Snapshot;
use crate::monitor::bandwidth::{BandwidthSupervisor, ProcfsProbe};
use crate::monitor::correlator::{top, ProcessCorrelator};
use crate::monitor::details::InterfaceDetailsCache;
use crate::monitor::hub::SnapshotSource;
use crate::monitor::rates::{categorize, read_counters, RateSampler};
use crate::utils::error::{AppError, AppResult};

/// Every producer of the agent behind one handle
pub struct Telemetry {
    proc_root: PathBuf,
    top_n: usize,
    rates: Mutex<RateSampler>,
    details: Mutex<InterfaceDetailsCache>,
    correlator: ProcessCorrelator,
    bandwidth: Arc<BandwidthSupervisor>,
}

impl Telemetry {
    pub fn new(
        config: &AppConfig,
        details: InterfaceDetailsCache,
        bandwidth: Arc<BandwidthSupervisor>,
    ) -> Self {
        Self {
            proc_root: config.proc_root.clone(),
            top_n: config.top_processes,
            rates: Mutex::new(RateSampler::new(
                config.proc_root.clone(),
                config.prior_sample_max_idle_ticks,
            )),
            details: Mutex::new(details),
            correlator: ProcessCorrelator::new(config.proc_root.clone()),
            bandwidth,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let details = InterfaceDetailsCache::new(config.sys_root.clone(), config.details_ttl());
        let probe = Arc::new(ProcfsProbe::new(config.proc_root.clone()));
        let bandwidth = Arc::new(BandwidthSupervisor::new(
            config.sampler_path.clone(),
            config.name_cache_cap,
            probe,
        ));
        Self::new(config, details, bandwidth)
    }

    pub fn bandwidth(&self) -> &Arc<BandwidthSupervisor> {
        &self.bandwidth
    }

    /// Sample every interface and attach its cached details.
    ///
    /// Advances the rate sampler, so callers outside the broadcast loop
    /// shorten the next tick's measurement window.
    pub fn interfaces(&self) -> Vec<InterfaceStatus> {
        let samples = self.rates.lock().sample();
        let names: Vec<String> = samples.iter().map(|s| s.name.clone()).collect();

        let mut details = self.details.lock();
        details.retain(&names);
        samples
            .into_iter()
            .map(|sample| InterfaceStatus {
                details: details.get(&sample.name),
                sample,
            })
            .collect()
    }

    /// Names in the counter table, in category order
    pub fn interface_names(&self) -> AppResult<Vec<String>> {
        let mut counters = read_counters(&self.proc_root)?;
        counters.sort_by(|a, b| {
            categorize(&a.name)
                .cmp(&categorize(&b.name))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(counters.into_iter().map(|c| c.name).collect())
    }

    pub fn interface_details(&self, name: &str) -> AppResult<InterfaceDetails> {
        let present = read_counters(&self.proc_root)?.iter().any(|c| c.name == name);
        if !present {
            return Err(AppError::NotFound(format!("interface {}", name)));
        }
        Ok(self.details.lock().get(name))
    }

    pub fn invalidate_details(&self) {
        self.details.lock().invalidate();
    }

    /// All socket-owning processes plus the busiest `top_n`
    pub fn processes(&self) -> (Vec<ProcessConnectionInfo>, Vec<ProcessConnectionInfo>) {
        let processes = self.correlator.list_processes();
        let busiest = top(&processes, self.top_n);
        (processes, busiest)
    }

    pub fn bandwidth_report(&self) -> BandwidthReport {
        self.bandwidth.report()
    }

    /// Periodically drop bandwidth state of exited processes
    pub fn spawn_maintenance(&self, every: Duration) -> JoinHandle<()> {
        let bandwidth = self.bandwidth.clone();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately; nothing to clean yet
            ticker.tick().await;
            info!("Bandwidth maintenance every {:?}", every);

            loop {
                ticker.tick().await;
                let bandwidth = bandwidth.clone();
                match tokio::task::spawn_blocking(move || bandwidth.cleanup_stale_data()).await {
                    Ok(report) => debug!("Maintenance pass: {:?}", report),
                    Err(e) => error!("Maintenance task failed: {}", e),
                }
            }
        })
    }
}

impl SnapshotSource for Telemetry {
    fn collect(&self) -> Snapshot {
        let interfaces = self.interfaces();
        let (processes, top_processes) = self.processes();
        let BandwidthReport { data, enabled } = self.bandwidth.report();

        Snapshot {
            interfaces,
            processes,
            top_processes,
            bandwidth: data,
            bandwidth_enabled: enabled,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::monitor::bandwidth::ProcessProbe;
    use crate::monitor::details::AddressSource;
    use std::fs;
    use std::net::IpAddr;
    use std::os::unix::fs::symlink;
    use std::path::Path;

    struct FixedAddresses;

    impl AddressSource for FixedAddresses {
        fn addresses(&self, name: &str) -> Vec<IpAddr> {
            match name {
                "eth0" => vec!["192.168.1.20".parse().unwrap(), "fe80::1".parse().unwrap()],
                _ => Vec::new(),
            }
        }
    }

    struct NobodyAlive;

    impl ProcessProbe for NobodyAlive {
        fn is_alive(&self, _pid: u32) -> bool {
            false
        }

        fn name_of(&self, _pid: u32) -> Option<String> {
            None
        }
    }

    const NET_DEV: &str = "Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:    4200      42    0    0    0     0          0         0     4200      42    0    0    0     0       0          0
 wlan0:   90000     300    0    0    0     0          0         0    12000     120    0    0    0     0       0          0
  eth0: 1000000    1000    0    0    0     0          0         0   500000     800    0    0    0     0       0          0
";

    /// A proc root with counters, one tcp connection and its owner, plus a sys root
    pub(crate) fn fixture() -> (tempfile::TempDir, AppConfig) {
        let root = tempfile::tempdir().unwrap();
        let proc_root = root.path().join("proc");
        let sys_root = root.path().join("sys");

        fs::create_dir_all(proc_root.join("net")).unwrap();
        fs::write(proc_root.join("net/dev"), NET_DEV).unwrap();
        fs::write(
            proc_root.join("net/tcp"),
            "header\n   0: 0100007F:1F90 0100007F:C000 01 00000000:00000000 00:00000000 00000000 0 0 4711 1\n",
        )
        .unwrap();

        let pid_dir = proc_root.join("321");
        fs::create_dir_all(pid_dir.join("fd")).unwrap();
        fs::write(pid_dir.join("comm"), "nginx\n").unwrap();
        fs::write(pid_dir.join("cmdline"), "nginx\0-g\0daemon off;\0").unwrap();
        symlink("socket:[4711]", pid_dir.join("fd/3")).unwrap();

        let eth0 = sys_root.join("class/net/eth0");
        fs::create_dir_all(&eth0).unwrap();
        fs::write(eth0.join("address"), "52:54:00:12:34:56\n").unwrap();
        fs::write(eth0.join("mtu"), "1500\n").unwrap();
        fs::write(eth0.join("operstate"), "up\n").unwrap();

        let config = AppConfig {
            proc_root,
            sys_root,
            top_processes: 1,
            ..AppConfig::default()
        };
        (root, config)
    }

    pub(crate) fn telemetry(config: &AppConfig) -> Telemetry {
        let details = InterfaceDetailsCache::with_address_source(
            config.sys_root.clone(),
            config.details_ttl(),
            Box::new(FixedAddresses),
        );
        let bandwidth = Arc::new(BandwidthSupervisor::new(
            "/nonexistent/sampler",
            500,
            Arc::new(NobodyAlive),
        ));
        Telemetry::new(config, details, bandwidth)
    }

    fn write_counters(proc_root: &Path, content: &str) {
        fs::write(proc_root.join("net/dev"), content).unwrap();
    }

    #[test]
    fn snapshot_carries_every_producer() {
        let (_root, config) = fixture();
        let snapshot = telemetry(&config).collect();

        let names: Vec<&str> = snapshot.interfaces.iter().map(|i| i.sample.name.as_str()).collect();
        assert_eq!(names, ["eth0", "wlan0", "lo"]);

        let eth0 = &snapshot.interfaces[0];
        assert_eq!(eth0.details.mac, "52:54:00:12:34:56");
        assert_eq!(eth0.details.ipv4, ["192.168.1.20"]);
        assert!(eth0.details.ipv6.is_empty());
        // First observation has no prior sample
        assert_eq!(eth0.sample.rx_speed, 0.0);

        assert_eq!(snapshot.processes.len(), 1);
        assert_eq!(snapshot.processes[0].name, "nginx");
        assert_eq!(snapshot.top_processes.len(), 1);
        assert!(snapshot.bandwidth.is_empty());
        assert!(!snapshot.bandwidth_enabled);
        assert!(snapshot.timestamp > 0);
    }

    #[test]
    fn second_collection_reports_rates() {
        let (_root, config) = fixture();
        let telemetry = telemetry(&config);
        telemetry.collect();

        std::thread::sleep(Duration::from_millis(20));
        write_counters(&config.proc_root, &NET_DEV.replace("1000000", "1100000"));
        let snapshot = telemetry.collect();
        let eth0 = snapshot.interfaces.iter().find(|i| i.sample.name == "eth0").unwrap();
        assert!(eth0.sample.rx_speed > 0.0);
        assert_eq!(eth0.sample.tx_speed, 0.0);
    }

    #[test]
    fn details_for_unknown_interface_is_not_found() {
        let (_root, config) = fixture();
        let telemetry = telemetry(&config);
        assert!(matches!(telemetry.interface_details("eth9"), Err(AppError::NotFound(_))));

        let details = telemetry.interface_details("wlan0").unwrap();
        assert_eq!(details.mac, "unknown");
    }

    #[test]
    fn interface_names_follow_category_order() {
        let (_root, config) = fixture();
        assert_eq!(telemetry(&config).interface_names().unwrap(), ["eth0", "wlan0", "lo"]);
    }

    #[test]
    fn missing_counter_table_degrades_to_empty() {
        let (_root, config) = fixture();
        fs::remove_file(config.proc_root.join("net/dev")).unwrap();
        let telemetry = telemetry(&config);

        assert!(telemetry.collect().interfaces.is_empty());
        assert!(telemetry.interface_names().is_err());
    }
}
