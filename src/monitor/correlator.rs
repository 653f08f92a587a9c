use log::{debug, trace, warn};
use procfs::process::{all_processes_with_root, FDTarget, Process, ProcessesIter};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::process::ProcessConnectionInfo;
use crate::models::socket::{ConnectionId, SocketRecord};
use crate::monitor::sockets::SocketTable;
use crate::utils::error::AppResult;

/// Placeholder for per-process metadata that could not be read
pub const UNKNOWN: &str = "unknown";

/// Joins the connection tables with every process's open handles
#[derive(Debug, Clone)]
pub struct ProcessCorrelator {
    proc_root: PathBuf,
    sockets: SocketTable,
}

impl ProcessCorrelator {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        let proc_root = proc_root.into();
        Self {
            sockets: SocketTable::new(proc_root.clone()),
            proc_root,
        }
    }

    /// Processes owning at least one socket, most connections first.
    ///
    /// A process that vanishes or denies access mid-scan only loses its own
    /// entry; the scan continues.
    pub fn list_processes(&self) -> Vec<ProcessConnectionInfo> {
        let sockets = self.sockets.read_all();
        if sockets.is_empty() {
            return Vec::new();
        }

        let processes = match self.enumerate() {
            Ok(processes) => processes,
            Err(e) => {
                warn!("Cannot enumerate processes under {}: {}", self.proc_root.display(), e);
                return Vec::new();
            }
        };

        let mut result = Vec::new();
        for process in processes {
            let process = match process {
                Ok(process) => process,
                Err(e) => {
                    trace!("Skipping process: {}", e);
                    continue;
                }
            };

            let owned = owned_sockets(&process, &sockets);
            if owned.is_empty() {
                continue;
            }

            let pid = process.pid() as u32;
            let mut info = ProcessConnectionInfo::new(
                pid,
                read_comm(&self.proc_root, pid),
                read_cmdline(&process),
            );
            for socket in owned {
                info.push_socket(socket);
            }
            result.push(info);
        }

        sort_by_connections(&mut result);
        debug!("Correlated sockets for {} process(es)", result.len());
        result
    }

    fn enumerate(&self) -> AppResult<ProcessesIter> {
        Ok(all_processes_with_root(&self.proc_root)?)
    }
}

/// The first `n` entries of a list already sorted by [`sort_by_connections`]
pub fn top(processes: &[ProcessConnectionInfo], n: usize) -> Vec<ProcessConnectionInfo> {
    processes.iter().take(n).cloned().collect()
}

/// Most connections first; pid breaks ties so output is stable
pub fn sort_by_connections(processes: &mut [ProcessConnectionInfo]) {
    processes.sort_by(|a, b| b.total_count.cmp(&a.total_count).then_with(|| a.pid.cmp(&b.pid)));
}

/// Sockets referenced by `process`'s handle table.
///
/// The lookup set is never consumed: a socket shared by several processes
/// (e.g. forked workers on one listener) is reported for each of them.
fn owned_sockets(
    process: &Process,
    sockets: &HashMap<ConnectionId, SocketRecord>,
) -> Vec<SocketRecord> {
    let fds = match process.fd() {
        Ok(fds) => fds,
        Err(e) => {
            trace!("fd table of pid {} unreadable: {}", process.pid(), e);
            return Vec::new();
        }
    };

    fds.filter_map(|fd| fd.ok())
        .filter_map(|fd| match fd.target {
            FDTarget::Socket(inode) => sockets.get(&inode).cloned(),
            _ => None,
        })
        .collect()
}

/// Short process name, best effort
pub fn read_comm(proc_root: &Path, pid: u32) -> String {
    fs::read_to_string(proc_root.join(pid.to_string()).join("comm"))
        .map(|name| name.trim().to_string())
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn read_cmdline(process: &Process) -> String {
    match process.cmdline() {
        Ok(args) if !args.is_empty() => args.join(" "),
        _ => UNKNOWN.to_string(),
    }
}
