//! `ThreadManager` backend that runs items on a tokio blocking pool.
//!
//! Every item is associated with one shared [`CancellationToken`]. Abort
//! cancels the token: items that have not started yet are skipped, and
//! running items may observe the token (see [`PooledThreadManager::cancellation_token`])
//! and stop early, typically by calling [`Cancelled::raise`](super::Cancelled::raise).

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::CoreError;
use crate::runtime::TokioPool;

use super::{
    current_dispatch, DispatchGate, DispatchStats, Outcome, ThreadManager, WorkItem, MAX_THREADS,
};

/// Pooled-task dispatcher.
pub struct PooledThreadManager {
    gate: Arc<DispatchGate>,
    pool: TokioPool,
    cancel: CancellationToken,
}

impl PooledThreadManager {
    /// Create a dispatcher with its own runtime.
    ///
    /// The runtime may grow to [`MAX_THREADS`] blocking threads so that
    /// raising the cap later never leaves admitted items queued inside tokio.
    /// Threads are only started on demand.
    ///
    /// # Errors
    ///
    /// - `CoreError::Configuration` if `max_threads` is outside `[1, 100]`
    /// - `CoreError::Spawn` if the runtime cannot be built
    pub fn new(max_threads: usize) -> Result<Self, CoreError> {
        let gate = DispatchGate::new("pooled", max_threads, current_dispatch())?;
        let pool = TokioPool::with_blocking_threads(MAX_THREADS)?;
        Ok(Self::from_parts(gate, pool))
    }

    /// Create a dispatcher on the shared runtime behind `handle`.
    ///
    /// # Errors
    ///
    /// `CoreError::Configuration` if `max_threads` is outside `[1, 100]`.
    pub fn with_handle(max_threads: usize, handle: Handle) -> Result<Self, CoreError> {
        let gate = DispatchGate::new("pooled", max_threads, current_dispatch())?;
        Ok(Self::from_parts(gate, TokioPool::new(handle)))
    }

    fn from_parts(gate: Arc<DispatchGate>, pool: TokioPool) -> Self {
        tracing::dispatcher::with_default(gate.dispatch(), || {
            info!(
                manager = %gate.name(),
                max_threads = gate.max_threads(),
                owned_runtime = pool.is_owned(),
                "pooled thread manager initialized"
            );
        });
        Self {
            gate,
            pool,
            cancel: CancellationToken::new(),
        }
    }

    /// Token cancelled by `abort_all`; work items may clone it and check it.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn schedule(&self, item: WorkItem) -> Result<(), CoreError> {
        let slot = self.gate.acquire()?;
        let gate = Arc::clone(&self.gate);
        let cancel = self.cancel.clone();

        self.pool.spawn_blocking(move || {
            let dispatch = gate.dispatch().clone();
            tracing::dispatcher::with_default(&dispatch, || {
                if cancel.is_cancelled() {
                    debug!(manager = %gate.name(), "skipping work item cancelled before start");
                    gate.record(Outcome::Cancelled);
                } else {
                    gate.run_contained(item, || cancel.is_cancelled());
                }
                drop(slot);
            });
        });
        Ok(())
    }
}

impl ThreadManager for PooledThreadManager {
    fn do_work(&self, item: WorkItem) -> Result<(), CoreError> {
        if self.gate.max_threads() > 1 {
            return self.schedule(item);
        }
        let slot = self.gate.acquire()?;
        let cancel = &self.cancel;
        tracing::dispatcher::with_default(self.gate.dispatch(), || {
            self.gate.run_contained(item, || cancel.is_cancelled());
        });
        drop(slot);
        Ok(())
    }

    fn has_running_threads(&self) -> bool {
        self.gate.has_running()
    }

    fn abort_all(&self) {
        if self.gate.abort() {
            self.cancel.cancel();
            tracing::dispatcher::with_default(self.gate.dispatch(), || {
                info!(manager = %self.gate.name(), "abort requested; cancellation signalled");
            });
        }
    }

    fn dispose(&self) {
        self.abort_all();
        if self.gate.dispose() {
            self.pool.shutdown();
            tracing::dispatcher::with_default(self.gate.dispatch(), || {
                debug!(manager = %self.gate.name(), "pooled thread manager disposed");
            });
        }
    }

    fn max_threads(&self) -> usize {
        self.gate.max_threads()
    }

    fn set_max_threads(&self, max_threads: usize) -> Result<(), CoreError> {
        self.gate.set_max_threads(max_threads)
    }

    fn stats(&self) -> DispatchStats {
        self.gate.stats()
    }
}

impl Drop for PooledThreadManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
