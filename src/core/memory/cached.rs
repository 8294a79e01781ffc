use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::CoreError;
use crate::util::telemetry::current_dispatch;

use super::MemoryMonitor;

/// Refresh interval used when the configured expiration is not positive.
pub const DEFAULT_CACHE_EXPIRATION_SECS: u64 = 5;

type Sampler = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Memoizes a memory reading and refreshes it on a background thread.
///
/// The first sample is taken synchronously at construction, so the first
/// read is never stale. Reads are a single atomic load.
pub struct CachedMemoryMonitor {
    cached: Arc<AtomicU64>,
    interval: Duration,
    stop_tx: Mutex<Option<Sender<()>>>,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl CachedMemoryMonitor {
    /// Cache readings of `inner`, refreshing every `cache_expiration_secs`.
    ///
    /// A non-positive expiration falls back to
    /// [`DEFAULT_CACHE_EXPIRATION_SECS`].
    ///
    /// # Errors
    ///
    /// `CoreError::Spawn` if the refresh thread cannot be started.
    pub fn new(inner: Arc<dyn MemoryMonitor>, cache_expiration_secs: i64) -> Result<Self, CoreError> {
        Self::with_sampler(cache_expiration_secs, move || inner.current_usage_mb())
    }

    /// Cache readings produced by `sampler`.
    ///
    /// # Errors
    ///
    /// `CoreError::Spawn` if the refresh thread cannot be started.
    pub fn with_sampler<F>(cache_expiration_secs: i64, sampler: F) -> Result<Self, CoreError>
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        let interval = refresh_interval(cache_expiration_secs);
        let sampler: Sampler = Arc::new(sampler);
        let cached = Arc::new(AtomicU64::new(sampler()));
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let dispatch = current_dispatch();
        let cell = Arc::clone(&cached);
        let refresher = thread::Builder::new()
            .name("memory-refresh".into())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => refresh(&sampler, &cell),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            debug!("memory refresh stopped");
                            break;
                        }
                    }
                });
            })?;

        debug!(interval_ms = interval.as_millis(), "cached memory monitor started");
        Ok(Self {
            cached,
            interval,
            stop_tx: Mutex::new(Some(stop_tx)),
            refresher: Mutex::new(Some(refresher)),
        })
    }

    /// Interval between background refreshes.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        self.interval
    }
}

impl MemoryMonitor for CachedMemoryMonitor {
    fn current_usage_mb(&self) -> u64 {
        self.cached.load(Ordering::Relaxed)
    }

    fn dispose(&self) {
        // Dropping the sender wakes the refresher with `Disconnected`.
        drop(self.stop_tx.lock().take());
        let Some(handle) = self.refresher.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Disposed from inside the refresh callback: the loop exits on
            // its next wait, joining here would deadlock.
            return;
        }
        if handle.join().is_err() {
            warn!("memory refresh thread panicked");
        }
    }
}

impl Drop for CachedMemoryMonitor {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn refresh_interval(cache_expiration_secs: i64) -> Duration {
    let secs = u64::try_from(cache_expiration_secs)
        .ok()
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_CACHE_EXPIRATION_SECS);
    Duration::from_millis(secs.max(1).saturating_mul(1000))
}

fn refresh(sampler: &Sampler, cell: &AtomicU64) {
    match panic::catch_unwind(AssertUnwindSafe(|| sampler())) {
        Ok(usage_mb) => {
            cell.store(usage_mb, Ordering::Relaxed);
            debug!(usage_mb, "memory usage refreshed");
        }
        Err(_) => warn!("memory sampler panicked; keeping previous reading"),
    }
}
