use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tracing::debug;

/// Bytes in one megabyte as used for every MB figure in this crate.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Source of process memory readings.
pub trait MemoryMonitor: Send + Sync {
    /// Memory currently attributed to the process, truncated to whole MB.
    fn current_usage_mb(&self) -> u64;

    /// Release any resources held by the monitor. Safe to call repeatedly.
    fn dispose(&self) {}
}

/// Samples the resident set size of the current process on every call.
pub struct ProcessMemoryMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ProcessMemoryMonitor {
    /// Create a monitor for the current process.
    #[must_use]
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                debug!(error = err, "current pid unavailable; memory usage will read as 0");
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for ProcessMemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMonitor for ProcessMemoryMonitor {
    fn current_usage_mb(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return 0;
        }
        system
            .process(pid)
            .map_or(0, |process| process.memory() / BYTES_PER_MB)
    }
}
