//! Bounded-concurrency dispatch of crawl work items.
//!
//! A `ThreadManager` accepts opaque work items and runs them with parallelism
//! capped at a configured maximum. Two interchangeable backends exist:
//!
//! - [`DedicatedThreadManager`]: one named OS thread per work item.
//! - [`PooledThreadManager`]: items run on a tokio runtime's blocking pool and
//!   share a [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! Both backends share the bookkeeping in `DispatchGate`: the running
//! counter, the abort/dispose flags and the condvar that blocks submitters
//! while the gate is saturated. There is no queue; a saturated gate blocks the
//! caller of `do_work` until a running item finishes.
//!
//! # Example
//!
//! ```rust,ignore
//! use crawl_governor::core::{DedicatedThreadManager, ThreadManager, ThreadManagerExt};
//!
//! let manager = DedicatedThreadManager::new(8)?;
//! manager.submit(|| fetch_page("https://example.com/"))?;
//! while manager.has_running_threads() {
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! manager.dispose();
//! ```

mod dedicated;
#[cfg(feature = "tokio-runtime")]
mod pooled;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::core::CoreError;
pub(crate) use crate::util::telemetry::current_dispatch;

pub use dedicated::DedicatedThreadManager;
#[cfg(feature = "tokio-runtime")]
pub use pooled::PooledThreadManager;

/// Smallest accepted concurrency cap.
pub const MIN_THREADS: usize = 1;
/// Largest accepted concurrency cap.
pub const MAX_THREADS: usize = 100;

/// An opaque, side-effecting unit of work.
pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

/// Panic payload a work item raises to report that it stopped because it
/// observed cancellation. Such faults are logged as expected, not as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl Cancelled {
    /// Unwind out of the current work item as cancelled. The panic hook is
    /// not invoked, so nothing is printed.
    pub fn raise() -> ! {
        panic::resume_unwind(Box::new(Self))
    }
}

/// Bounded-concurrency dispatcher.
pub trait ThreadManager: Send + Sync {
    /// Run `item`, blocking only while the concurrency gate is saturated.
    ///
    /// With a cap of one the item runs synchronously on the calling thread.
    /// Faults inside the item are logged and never returned here.
    ///
    /// # Errors
    ///
    /// - `CoreError::InvalidUsage` after `abort_all` or `dispose`
    /// - `CoreError::Spawn` if the backend could not start the item
    fn do_work(&self, item: WorkItem) -> Result<(), CoreError>;

    /// Whether any dispatched item is still counted as running.
    fn has_running_threads(&self) -> bool;

    /// Stop accepting work and reset the running count. Advisory: how far
    /// in-flight work is affected depends on the backend.
    fn abort_all(&self);

    /// Abort and release backend resources. Safe to call repeatedly.
    fn dispose(&self);

    /// Current concurrency cap.
    fn max_threads(&self) -> usize;

    /// Change the concurrency cap for subsequent gating decisions.
    ///
    /// # Errors
    ///
    /// `CoreError::Configuration` if `max_threads` is outside `[1, 100]`.
    fn set_max_threads(&self, max_threads: usize) -> Result<(), CoreError>;

    /// Snapshot of dispatch counters.
    fn stats(&self) -> DispatchStats;
}

/// Convenience submission of closures without boxing at the call site.
pub trait ThreadManagerExt {
    /// Box `work` and hand it to [`ThreadManager::do_work`].
    ///
    /// # Errors
    ///
    /// Same as [`ThreadManager::do_work`].
    fn submit<F>(&self, work: F) -> Result<(), CoreError>
    where
        F: FnOnce() + Send + 'static;
}

impl<T: ThreadManager + ?Sized> ThreadManagerExt for T {
    fn submit<F>(&self, work: F) -> Result<(), CoreError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.do_work(Box::new(work))
    }
}

/// Validate a concurrency cap.
///
/// # Errors
///
/// `CoreError::Configuration` if `max_threads` is outside `[1, 100]`.
pub fn validate_max_threads(max_threads: usize) -> Result<(), CoreError> {
    if (MIN_THREADS..=MAX_THREADS).contains(&max_threads) {
        Ok(())
    } else {
        Err(CoreError::config(format!(
            "max threads must be between {MIN_THREADS} and {MAX_THREADS}, got {max_threads}"
        )))
    }
}

/// Statistics about dispatcher utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Configured concurrency cap.
    pub max_threads: usize,
    /// Items currently counted as running.
    pub running: usize,
    /// Items accepted by `do_work`.
    pub submitted: u64,
    /// Items that returned normally.
    pub completed: u64,
    /// Items that panicked for a reason other than cancellation.
    pub faulted: u64,
    /// Items that were skipped or stopped because of cancellation.
    pub cancelled: u64,
}

/// Internal counters (lock-free atomics).
#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    faulted: AtomicU64,
    cancelled: AtomicU64,
}

/// How a contained work item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Faulted,
    Cancelled,
}

#[derive(Debug)]
struct GateState {
    max_threads: usize,
    running: usize,
    aborted: bool,
    disposed: bool,
}

/// Gate, counters and log context shared by both backends.
///
/// Every change to the running count and the gate happens under one mutex;
/// the condvar wakes submitters blocked on a saturated gate.
pub(crate) struct DispatchGate {
    name: String,
    state: Mutex<GateState>,
    slot_freed: Condvar,
    counters: DispatchCounters,
    dispatch: tracing::Dispatch,
}

impl DispatchGate {
    pub(crate) fn new(
        kind: &str,
        max_threads: usize,
        dispatch: tracing::Dispatch,
    ) -> Result<Arc<Self>, CoreError> {
        validate_max_threads(max_threads)?;
        let name = format!("{kind}-{}", uuid::Uuid::new_v4().simple());
        Ok(Arc::new(Self {
            name,
            state: Mutex::new(GateState {
                max_threads,
                running: 0,
                aborted: false,
                disposed: false,
            }),
            slot_freed: Condvar::new(),
            counters: DispatchCounters::default(),
            dispatch,
        }))
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn dispatch(&self) -> &tracing::Dispatch {
        &self.dispatch
    }

    pub(crate) fn max_threads(&self) -> usize {
        self.state.lock().max_threads
    }

    pub(crate) fn set_max_threads(&self, max_threads: usize) -> Result<(), CoreError> {
        validate_max_threads(max_threads)?;
        let mut state = self.state.lock();
        state.max_threads = max_threads;
        drop(state);
        // A raised cap may admit several blocked submitters at once.
        self.slot_freed.notify_all();
        Ok(())
    }

    pub(crate) fn has_running(&self) -> bool {
        self.state.lock().running > 0
    }

    fn check_accepting(state: &GateState) -> Result<(), CoreError> {
        if state.disposed {
            Err(CoreError::usage("thread manager has been disposed"))
        } else if state.aborted {
            Err(CoreError::usage("cannot do work after abort_all"))
        } else {
            Ok(())
        }
    }

    /// Block until a slot is free, then take it.
    pub(crate) fn acquire(self: &Arc<Self>) -> Result<SlotGuard, CoreError> {
        let mut state = self.state.lock();
        Self::check_accepting(&state)?;
        while state.running >= state.max_threads && !state.aborted {
            self.slot_freed.wait(&mut state);
        }
        // Abort wakes every blocked submitter; none of them may proceed.
        Self::check_accepting(&state)?;
        state.running += 1;
        drop(state);
        self.record_submitted();
        Ok(SlotGuard {
            gate: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.running = state.running.saturating_sub(1);
        let reopened = state.running < state.max_threads;
        drop(state);
        if reopened {
            self.slot_freed.notify_one();
        }
    }

    /// Set the aborted flag and zero the running count. Returns true the
    /// first time.
    pub(crate) fn abort(&self) -> bool {
        let mut state = self.state.lock();
        let first = !state.aborted;
        state.aborted = true;
        state.running = 0;
        drop(state);
        self.slot_freed.notify_all();
        first
    }

    /// Abort and mark disposed. Returns true the first time.
    pub(crate) fn dispose(&self) -> bool {
        self.abort();
        let mut state = self.state.lock();
        let first = !state.disposed;
        state.disposed = true;
        first
    }

    fn record_submitted(&self) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Completed => &self.counters.completed,
            Outcome::Faulted => &self.counters.faulted,
            Outcome::Cancelled => &self.counters.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> DispatchStats {
        let state = self.state.lock();
        DispatchStats {
            max_threads: state.max_threads,
            running: state.running,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            faulted: self.counters.faulted.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Run `item` with fault containment and record the outcome.
    ///
    /// `is_cancelled` is consulted only when the item panics, to tell an
    /// expected cancellation apart from a fault.
    pub(crate) fn run_contained(&self, item: WorkItem, is_cancelled: impl Fn() -> bool) -> Outcome {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(item)) {
            Ok(()) => {
                debug!(manager = %self.name, "work item completed");
                Outcome::Completed
            }
            Err(payload) if payload.is::<Cancelled>() || is_cancelled() => {
                debug!(manager = %self.name, "work item cancelled");
                Outcome::Cancelled
            }
            Err(payload) => {
                let err = CoreError::WorkFault(panic_message(payload.as_ref()));
                error!(manager = %self.name, error = %err, "work item faulted");
                Outcome::Faulted
            }
        };
        self.record(outcome);
        outcome
    }
}

/// Holds one running slot; releasing it on drop keeps the decrement to
/// exactly once per dispatched item.
pub(crate) struct SlotGuard {
    gate: Arc<DispatchGate>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.gate.release();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
