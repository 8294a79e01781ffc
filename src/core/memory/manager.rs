use std::sync::Arc;

use parking_lot::Mutex;
use sysinfo::System;
use tracing::{debug, warn};

use crate::core::CoreError;

use super::{MemoryMonitor, BYTES_PER_MB};

/// Reservation-style check for additional memory.
pub trait MemoryProbe: Send + Sync {
    /// Whether `size_mb` more megabytes could be obtained right now.
    ///
    /// # Errors
    ///
    /// `CoreError::PlatformUnsupported` if the host cannot answer.
    fn try_reserve_mb(&self, size_mb: u64) -> Result<bool, CoreError>;
}

/// Probe backed by the operating system's available-memory figure.
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    /// Create a probe.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn try_reserve_mb(&self, size_mb: u64) -> Result<bool, CoreError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(CoreError::PlatformUnsupported(
                "memory statistics are not available on this platform".into(),
            ));
        }
        let mut system = self.system.lock();
        system.refresh_memory();
        if system.total_memory() == 0 {
            return Err(CoreError::PlatformUnsupported(
                "host reported no physical memory".into(),
            ));
        }
        let available_mb = system.available_memory() / BYTES_PER_MB;
        debug!(requested_mb = size_mb, available_mb, "memory probe");
        Ok(size_mb <= available_mb)
    }
}

/// Memory admission control over a [`MemoryMonitor`].
pub struct MemoryManager {
    monitor: Arc<dyn MemoryMonitor>,
    probe: Box<dyn MemoryProbe>,
}

impl MemoryManager {
    /// Manage `monitor` with the operating-system probe.
    #[must_use]
    pub fn new(monitor: Arc<dyn MemoryMonitor>) -> Self {
        Self::with_probe(monitor, Box::new(SystemMemoryProbe::new()))
    }

    /// Manage `monitor` with a custom probe.
    #[must_use]
    pub fn with_probe(monitor: Arc<dyn MemoryMonitor>, probe: Box<dyn MemoryProbe>) -> Self {
        Self { monitor, probe }
    }

    /// Reading of the wrapped monitor.
    #[must_use]
    pub fn current_usage_mb(&self) -> u64 {
        self.monitor.current_usage_mb()
    }

    /// Whether current usage is strictly above `size_mb`.
    #[must_use]
    pub fn is_current_usage_above(&self, size_mb: i64) -> bool {
        i128::from(self.current_usage_mb()) > i128::from(size_mb)
    }

    /// Whether `size_mb` more megabytes appear to be available.
    ///
    /// Requests below one megabyte are always satisfiable. If the host
    /// cannot be probed the answer is an optimistic `true` and a warning is
    /// logged.
    #[must_use]
    pub fn is_space_available(&self, size_mb: i64) -> bool {
        let Ok(size_mb) = u64::try_from(size_mb) else {
            return true;
        };
        if size_mb < 1 {
            return true;
        }
        match self.probe.try_reserve_mb(size_mb) {
            Ok(fits) => fits,
            Err(err) => {
                warn!(requested_mb = size_mb, error = %err, "memory probe unavailable; assuming space is available");
                true
            }
        }
    }

    /// Dispose the wrapped monitor.
    pub fn dispose(&self) {
        self.monitor.dispose();
    }
}
