//! Process runtime statistics
//!
//! Captured once per aggregation tick into gauges under `service.`:
//!
//! - `memory.rss`, `memory.virtual`, `memory.system_total` (bytes)
//! - `fd.open`, `fd.limit`
//! - `threads`
//! - `uptime` (seconds)
//! - `runtime.workers`, `runtime.alive_tasks` (tokio, when inside a runtime)
//!
//! Sources the platform does not offer are skipped rather than reported as 0.

use chrono::{DateTime, Utc};
use std::time::Instant;

use crate::constants::SERVICE_PREFIX;
use crate::registry::Registry;

/// One reading of the process statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub rss_bytes: Option<u64>,
    pub virtual_bytes: Option<u64>,
    pub system_memory_bytes: Option<u64>,
    pub open_fds: Option<u64>,
    pub fd_limit: Option<u64>,
    pub threads: Option<u64>,
    pub uptime_secs: u64,
    pub runtime_workers: Option<u64>,
    pub runtime_alive_tasks: Option<u64>,
}

impl ProcessStats {
    /// Read the current statistics of this process
    pub fn read(started: Instant) -> Self {
        let status = read_proc_status();
        let (runtime_workers, runtime_alive_tasks) = runtime_stats();
        Self {
            rss_bytes: status.rss_bytes,
            virtual_bytes: status.virtual_bytes,
            system_memory_bytes: detect_system_memory(),
            open_fds: count_open_fds(),
            fd_limit: detect_fd_limit(),
            threads: status.threads,
            uptime_secs: started.elapsed().as_secs(),
            runtime_workers,
            runtime_alive_tasks,
        }
    }

    /// Publish this reading as gauges under `<parent>service.`
    pub fn record(&self, parent: &Registry) {
        let service = parent.child(SERVICE_PREFIX);
        let values = [
            ("memory.rss", self.rss_bytes),
            ("memory.virtual", self.virtual_bytes),
            ("memory.system_total", self.system_memory_bytes),
            ("fd.open", self.open_fds),
            ("fd.limit", self.fd_limit),
            ("threads", self.threads),
            ("uptime", Some(self.uptime_secs)),
            ("runtime.workers", self.runtime_workers),
            ("runtime.alive_tasks", self.runtime_alive_tasks),
        ];
        for (name, value) in values {
            if let Some(value) = value {
                service
                    .gauge(name)
                    .update(i64::try_from(value).unwrap_or(i64::MAX));
            }
        }
    }
}

/// Read and publish the process statistics in one step
pub fn capture(parent: &Registry, started: Instant) {
    ProcessStats::read(started).record(parent);
}

#[derive(Debug, Default)]
struct ProcStatus {
    rss_bytes: Option<u64>,
    virtual_bytes: Option<u64>,
    threads: Option<u64>,
}

/// Parse the fields we need from `/proc/self/status`
fn parse_proc_status(content: &str) -> ProcStatus {
    let mut status = ProcStatus::default();
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        // Format: "VmRSS:	   10240 kB"
        let number = value
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok());
        match key {
            "VmRSS" => status.rss_bytes = number.map(|kb| kb * 1024),
            "VmSize" => status.virtual_bytes = number.map(|kb| kb * 1024),
            "Threads" => status.threads = number,
            _ => {}
        }
    }
    status
}

fn read_proc_status() -> ProcStatus {
    #[cfg(target_os = "linux")]
    {
        if let Ok(content) = std::fs::read_to_string("/proc/self/status") {
            return parse_proc_status(&content);
        }
        tracing::debug!("Failed to read /proc/self/status");
    }
    ProcStatus::default()
}

fn count_open_fds() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(entries) = std::fs::read_dir("/proc/self/fd") {
            return Some(entries.count() as u64);
        }
    }
    None
}

/// Soft RLIMIT_NOFILE, or the hard limit when the soft one is unlimited
#[allow(clippy::unnecessary_cast)] // rlim_t width differs across platforms
pub fn detect_fd_limit() -> Option<u64> {
    #[cfg(unix)]
    {
        // SAFETY: getrlimit only writes into the zeroed struct we own
        unsafe {
            let mut rlim = std::mem::zeroed::<libc::rlimit>();
            if libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) != 0 {
                tracing::debug!("getrlimit(RLIMIT_NOFILE) failed");
                return None;
            }
            if rlim.rlim_cur != libc::RLIM_INFINITY {
                return Some(rlim.rlim_cur as u64);
            }
            if rlim.rlim_max != libc::RLIM_INFINITY {
                return Some(rlim.rlim_max as u64);
            }
        }
    }
    None
}

/// Total system memory from `/proc/meminfo`
pub fn detect_system_memory() -> Option<u64> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    content
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Wall-clock start time of this process
///
/// Derived from the start tick in `/proc/self/stat` and the boot time in
/// `/proc/stat`. `None` off Linux or when either file is unreadable.
pub fn process_start_time() -> Option<DateTime<Utc>> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let start_ticks = parse_start_ticks(&std::fs::read_to_string("/proc/self/stat").ok()?)?;
    let boot_time = parse_boot_time(&std::fs::read_to_string("/proc/stat").ok()?)?;
    // SAFETY: sysconf has no preconditions
    let ticks_per_sec = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks_per_sec <= 0 {
        return None;
    }
    let ticks_per_sec = ticks_per_sec as u64;
    let secs = boot_time.checked_add(i64::try_from(start_ticks / ticks_per_sec).ok()?)?;
    let nanos = (start_ticks % ticks_per_sec) * 1_000_000_000 / ticks_per_sec;
    DateTime::from_timestamp(secs, nanos as u32)
}

/// Field 22 (`starttime`) of `/proc/<pid>/stat`
///
/// The command name may contain spaces and parentheses, so fields are
/// counted from the last `)`.
fn parse_start_ticks(stat: &str) -> Option<u64> {
    let (_, rest) = stat.rsplit_once(')')?;
    // rest starts at field 3 (state)
    rest.split_whitespace().nth(19)?.parse().ok()
}

/// `btime` line of `/proc/stat`, seconds since the epoch
fn parse_boot_time(stat: &str) -> Option<i64> {
    stat.lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}

fn runtime_stats() -> (Option<u64>, Option<u64>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let metrics = handle.metrics();
            (
                Some(metrics.num_workers() as u64),
                Some(metrics.num_alive_tasks() as u64),
            )
        }
        Err(_) => (None, None),
    }
}
