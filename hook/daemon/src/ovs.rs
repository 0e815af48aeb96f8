//! ovs-vswitchd process discovery
//!
//! Locates the running ovs-vswitchd and its upcall handler threads. Each
//! handler thread gets its own upcall batch in the kernel maps.

use anyhow::{Context, Result};
use log::debug;
use std::{fs, path::Path};

/// Command name of the OVS userspace daemon
pub const OVS_VSWITCHD_COMM: &str = "ovs-vswitchd";

/// Substring identifying upcall handler threads
const HANDLER_COMM: &str = "handler";

/// Find a process by exact command name
pub fn find_pid_by_comm(comm: &str) -> Result<Option<u32>> {
    let entries = fs::read_dir("/proc").context("Failed to read /proc")?;

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // Processes may exit while we scan
        let Ok(name) = fs::read_to_string(entry.path().join("comm")) else {
            continue;
        };
        if name.trim_end() == comm {
            return Ok(Some(pid));
        }
    }

    Ok(None)
}

/// Thread ids of the upcall handler threads of `pid`
pub fn handler_threads(pid: u32) -> Result<Vec<u32>> {
    let task_dir = Path::new("/proc").join(pid.to_string()).join("task");
    let entries = fs::read_dir(&task_dir)
        .with_context(|| format!("Failed to list threads of process {}", pid))?;

    let threads = entries.flatten().filter_map(|entry| {
        let tid = entry.file_name().to_str()?.parse::<u32>().ok()?;
        let comm = fs::read_to_string(entry.path().join("comm")).ok()?;
        Some((tid, comm.trim_end().to_string()))
    });

    let handlers = select_handlers(threads);
    debug!("Process {} has {} handler threads", pid, handlers.len());

    Ok(handlers)
}

/// Keep threads whose name marks them as upcall handlers, sorted by tid
pub fn select_handlers<I>(threads: I) -> Vec<u32>
where
    I: IntoIterator<Item = (u32, String)>,
{
    let mut tids: Vec<u32> = threads
        .into_iter()
        .filter(|(_, comm)| comm.contains(HANDLER_COMM))
        .map(|(tid, _)| tid)
        .collect();
    tids.sort_unstable();
    tids
}
