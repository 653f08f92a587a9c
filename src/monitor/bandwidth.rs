use log::{debug, info, trace, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{geteuid, Pid};
use parking_lot::Mutex;
use procfs::process::Process;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::models::bandwidth::{BandwidthRecord, BandwidthReport};
use crate::monitor::trace_parser::{SamplerLine, TraceParser};
use crate::utils::error::{AppError, AppResult};

/// Trace mode, 1s refresh, KB/s units, TCP and UDP
const SAMPLER_ARGS: &[&str] = &["-t", "-d", "1", "-v", "0", "-C"];

const READ_CHUNK: usize = 8 * 1024;

/// Liveness and name lookups for pids
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
    fn name_of(&self, pid: u32) -> Option<String>;
}

/// Probe backed by the process pseudo-filesystem
#[derive(Debug, Clone)]
pub struct ProcfsProbe {
    proc_root: PathBuf,
}

impl ProcfsProbe {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl ProcessProbe for ProcfsProbe {
    fn is_alive(&self, pid: u32) -> bool {
        Process::new_with_root(self.proc_root.join(pid.to_string())).is_ok()
    }

    fn name_of(&self, pid: u32) -> Option<String> {
        fs::read_to_string(self.proc_root.join(pid.to_string()).join("comm"))
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }
}

/// Lifecycle of the sampler subprocess
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerStatus {
    Stopped,
    Starting,
    Running,
}

/// Outcome of one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub records_evicted: usize,
    pub names_evicted: usize,
    pub names_retained: usize,
}

/// pid -> display name, remembering insertion order
#[derive(Debug, Default)]
struct NameCache {
    names: HashMap<u32, String>,
    order: VecDeque<u32>,
}

impl NameCache {
    fn resolve(&mut self, pid: u32, probe: &dyn ProcessProbe) -> String {
        if let Some(name) = self.names.get(&pid) {
            return name.clone();
        }
        match probe.name_of(pid) {
            Some(name) => {
                self.insert(pid, name.clone());
                name
            }
            // Not cached, so a later lookup can still succeed
            None => format!("pid-{pid}"),
        }
    }

    fn insert(&mut self, pid: u32, name: String) {
        if self.names.insert(pid, name).is_none() {
            self.order.push_back(pid);
        }
    }

    /// Drop entries for dead pids, oldest first
    fn evict_dead(&mut self, probe: &dyn ProcessProbe) -> usize {
        let before = self.names.len();
        let names = &mut self.names;
        self.order.retain(|pid| {
            if probe.is_alive(*pid) {
                true
            } else {
                names.remove(pid);
                false
            }
        });
        before - self.names.len()
    }

    fn len(&self) -> usize {
        self.names.len()
    }

    fn clear(&mut self) {
        self.names.clear();
        self.order.clear();
    }
}

#[derive(Debug)]
struct SamplerState {
    status: SamplerStatus,
    /// Bumped on every start and stop; tasks of an older run must not touch state
    generation: u64,
    child_pid: Option<u32>,
    tasks: Vec<JoinHandle<()>>,
    records: HashMap<u32, BandwidthRecord>,
    names: NameCache,
}

impl SamplerState {
    fn new() -> Self {
        Self {
            status: SamplerStatus::Stopped,
            generation: 0,
            child_pid: None,
            tasks: Vec::new(),
            records: HashMap::new(),
            names: NameCache::default(),
        }
    }

    fn ingest(&mut self, line: SamplerLine, probe: &dyn ProcessProbe) {
        let Some(path) = line.process_path() else {
            trace!("No pid in sampler token {}", line.token);
            return;
        };
        // The token's program path is unreliable for some processes, so the
        // display name always comes from the pid
        let name = self.names.resolve(path.pid, probe);
        self.records.insert(
            path.pid,
            BandwidthRecord {
                pid: path.pid,
                name,
                user_or_owner: path.owner,
                sent_rate_k_bs: line.sent,
                received_rate_k_bs: line.received,
            },
        );
    }

    fn reset(&mut self) {
        self.status = SamplerStatus::Stopped;
        self.child_pid = None;
        self.tasks.clear();
        self.records.clear();
        self.names.clear();
    }
}

/// Supervises the external per-process bandwidth sampler.
///
/// Missing privileges or a missing binary leave the feature disabled; that is
/// reported through `is_active`, not as an error. A sampler that dies is not
/// restarted automatically.
pub struct BandwidthSupervisor {
    sampler_path: String,
    name_cache_cap: usize,
    probe: Arc<dyn ProcessProbe>,
    state: Arc<Mutex<SamplerState>>,
}

impl BandwidthSupervisor {
    pub fn new(
        sampler_path: impl Into<String>,
        name_cache_cap: usize,
        probe: Arc<dyn ProcessProbe>,
    ) -> Self {
        Self {
            sampler_path: sampler_path.into(),
            name_cache_cap,
            probe,
            state: Arc::new(Mutex::new(SamplerState::new())),
        }
    }

    /// Start the sampler. Returns whether it is running afterwards.
    pub fn start(&self) -> bool {
        let attempt = {
            let mut state = self.state.lock();
            match state.status {
                SamplerStatus::Running => return true,
                SamplerStatus::Starting => return false,
                SamplerStatus::Stopped => state.status = SamplerStatus::Starting,
            }
            state.generation
        };

        match self.spawn_sampler(attempt) {
            Ok(pid) => {
                info!("Bandwidth sampler running (pid {})", pid);
                true
            }
            Err(e) => {
                warn!("Bandwidth monitoring disabled: {}", e);
                let mut state = self.state.lock();
                if state.generation == attempt {
                    state.status = SamplerStatus::Stopped;
                }
                false
            }
        }
    }

    /// Terminate the sampler and forget everything it reported.
    ///
    /// Does not wait for the subprocess to exit. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(pid) = state.child_pid {
            info!("Stopping bandwidth sampler (pid {})", pid);
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!("SIGTERM to sampler failed: {}", e);
            }
        }
        for task in state.tasks.drain(..) {
            task.abort();
        }
        state.generation += 1;
        state.reset();
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().status == SamplerStatus::Running
    }

    pub fn status(&self) -> SamplerStatus {
        self.state.lock().status
    }

    /// Active records, busiest first.
    ///
    /// Records of processes that have exited are evicted on the way.
    pub fn get_data(&self) -> Vec<BandwidthRecord> {
        let mut state = self.state.lock();
        let probe = self.probe.as_ref();
        state.records.retain(|pid, _| probe.is_alive(*pid));

        let mut data: Vec<BandwidthRecord> = state
            .records
            .values()
            .filter(|record| record.is_active())
            .cloned()
            .collect();
        data.sort_by(|a, b| {
            b.total_rate()
                .partial_cmp(&a.total_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.pid.cmp(&b.pid))
        });
        data
    }

    pub fn report(&self) -> BandwidthReport {
        BandwidthReport {
            data: self.get_data(),
            enabled: self.is_active(),
        }
    }

    /// Maintenance pass: evict dead pids from the records and the name cache.
    ///
    /// Live pids are never evicted, so the cache may stay above its cap when
    /// that many named processes are still running.
    pub fn cleanup_stale_data(&self) -> CleanupReport {
        let mut state = self.state.lock();
        let probe = self.probe.as_ref();

        let before = state.records.len();
        state.records.retain(|pid, _| probe.is_alive(*pid));
        let records_evicted = before - state.records.len();
        let names_evicted = state.names.evict_dead(probe);
        let names_retained = state.names.len();

        if names_retained > self.name_cache_cap {
            warn!(
                "Name cache holds {} live processes, above its cap of {}",
                names_retained, self.name_cache_cap
            );
        }
        if records_evicted + names_evicted > 0 {
            debug!(
                "Bandwidth cleanup evicted {} record(s) and {} name(s)",
                records_evicted, names_evicted
            );
        }

        CleanupReport {
            records_evicted,
            names_evicted,
            names_retained,
        }
    }

    /// Spawn the sampler for the start attempt made at `attempt`.
    ///
    /// A `stop()` in between bumps the generation; the fresh child is then
    /// terminated instead of being adopted.
    fn spawn_sampler(&self, attempt: u64) -> AppResult<u32> {
        if !geteuid().is_root() {
            return Err(AppError::Sampler("root privileges are required".to_string()));
        }
        let binary = resolve_binary(&self.sampler_path)
            .ok_or_else(|| AppError::Sampler(format!("{} not found", self.sampler_path)))?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(AppError::Sampler("no async runtime to supervise the sampler".to_string()));
        }

        let mut child = Command::new(&binary)
            .args(SAMPLER_ARGS)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| AppError::Sampler("sampler exited immediately".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Sampler("sampler stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();

        let mut state = self.state.lock();
        if state.status != SamplerStatus::Starting || state.generation != attempt {
            drop(state);
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!("SIGTERM to sampler failed: {}", e);
            }
            return Err(AppError::Sampler("stopped while starting".to_string()));
        }
        state.generation += 1;
        let generation = state.generation;
        state.child_pid = Some(pid);
        state.status = SamplerStatus::Running;
        state.tasks.push(tokio::spawn(pump_stdout(
            self.state.clone(),
            self.probe.clone(),
            generation,
            child,
            stdout,
        )));
        if let Some(stderr) = stderr {
            state.tasks.push(tokio::spawn(async move {
                let lines = drain_stderr(stderr).await;
                trace!("Sampler stderr closed after {} line(s)", lines);
            }));
        }
        Ok(pid)
    }
}

/// Feed the sampler's stdout into the record map until it closes
async fn pump_stdout(
    state: Arc<Mutex<SamplerState>>,
    probe: Arc<dyn ProcessProbe>,
    generation: u64,
    mut child: Child,
    mut stdout: ChildStdout,
) {
    let mut parser = TraceParser::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let lines = parser.feed(&buf[..n]);
                if lines.is_empty() {
                    continue;
                }
                let mut state = state.lock();
                if state.generation != generation {
                    return;
                }
                for line in lines {
                    state.ingest(line, probe.as_ref());
                }
            }
            Err(e) => {
                warn!("Reading bandwidth sampler output failed: {}", e);
                break;
            }
        }
    }

    let exit = child.wait().await;
    let mut state = state.lock();
    if state.generation == generation {
        match exit {
            Ok(status) => warn!("Bandwidth sampler exited ({}); monitoring disabled", status),
            Err(e) => warn!("Bandwidth sampler lost: {}; monitoring disabled", e),
        }
        state.reset();
    }
}

/// Log the sampler's stderr at debug level; returns the number of lines read.
///
/// Keeps reading until EOF whatever the bytes look like: dropping the pipe
/// early would kill the sampler with SIGPIPE on its next write.
async fn drain_stderr<R: AsyncRead + Unpin>(stderr: R) -> usize {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    let mut count = 0;
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                count += 1;
                debug!("sampler: {}", String::from_utf8_lossy(&line).trim_end());
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Sampler stderr read failed: {}", e);
                break;
            }
        }
    }
    count
}

/// Locate the sampler: a path is used as is, a bare name is searched in `PATH`
fn resolve_binary(sampler: &str) -> Option<PathBuf> {
    if sampler.contains('/') {
        let path = Path::new(sampler);
        return path.is_file().then(|| path.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(sampler))
        .find(|candidate| candidate.is_file())
}
