//! Tokio blocking-pool adapter.

use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};

/// Runs blocking closures on a tokio runtime's blocking pool.
///
/// The pool either borrows a handle to a runtime owned elsewhere or owns a
/// dedicated runtime that is shut down (without waiting) by [`TokioPool::shutdown`].
pub struct TokioPool {
    handle: Handle,
    owned: Mutex<Option<Runtime>>,
}

impl TokioPool {
    /// Share the runtime behind `handle`.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            owned: Mutex::new(None),
        }
    }

    /// Create a dedicated runtime whose blocking pool holds at most
    /// `max_blocking_threads` threads.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the runtime cannot be built.
    pub fn with_blocking_threads(max_blocking_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_blocking_threads.max(1))
            .thread_name("crawl-pool")
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Mutex::new(Some(runtime)),
        })
    }

    /// Handle of the runtime in use.
    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Whether this pool owns its runtime.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.owned.lock().is_some()
    }

    /// Run `job` on the blocking pool. If the runtime is gone the job is
    /// dropped without running.
    pub fn spawn_blocking<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        drop(self.handle.spawn_blocking(job));
    }

    /// Shut down an owned runtime without waiting for running jobs. No-op for
    /// a shared runtime and on repeated calls.
    pub fn shutdown(&self) {
        if let Some(runtime) = self.owned.lock().take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for TokioPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
