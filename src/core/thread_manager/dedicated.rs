//! `ThreadManager` backend that starts one OS thread per work item.
//!
//! Abort is advisory here: threads that already started are never
//! interrupted and run their item to completion. Only the running count is
//! reset and further submissions are refused.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info};

use crate::core::CoreError;

use super::{current_dispatch, DispatchGate, DispatchStats, ThreadManager, WorkItem};

/// Dedicated-thread dispatcher.
pub struct DedicatedThreadManager {
    gate: Arc<DispatchGate>,
    thread_seq: AtomicU64,
    stack_size: Option<usize>,
}

impl DedicatedThreadManager {
    /// Create a dispatcher capped at `max_threads` concurrent items.
    ///
    /// Log events from worker threads go to the tracing dispatcher that is
    /// current on the constructing thread.
    ///
    /// # Errors
    ///
    /// `CoreError::Configuration` if `max_threads` is outside `[1, 100]`.
    pub fn new(max_threads: usize) -> Result<Self, CoreError> {
        Self::with_dispatch(max_threads, current_dispatch())
    }

    /// Create a dispatcher that logs through `dispatch`.
    ///
    /// # Errors
    ///
    /// `CoreError::Configuration` if `max_threads` is outside `[1, 100]`.
    pub fn with_dispatch(max_threads: usize, dispatch: tracing::Dispatch) -> Result<Self, CoreError> {
        let gate = DispatchGate::new("dedicated", max_threads, dispatch)?;
        tracing::dispatcher::with_default(gate.dispatch(), || {
            info!(manager = %gate.name(), max_threads, "dedicated thread manager initialized");
        });
        Ok(Self {
            gate,
            thread_seq: AtomicU64::new(0),
            stack_size: None,
        })
    }

    /// Use `stack_size` bytes for every worker thread.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    fn spawn(&self, item: WorkItem) -> Result<(), CoreError> {
        let slot = self.gate.acquire()?;
        let seq = self.thread_seq.fetch_add(1, Ordering::Relaxed);
        let gate = Arc::clone(&self.gate);

        let mut builder = thread::Builder::new().name(format!("crawl-worker-{seq}"));
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        // If the spawn fails the closure (and the slot inside it) is dropped,
        // which gives the slot back.
        builder.spawn(move || {
            let dispatch = gate.dispatch().clone();
            tracing::dispatcher::with_default(&dispatch, || {
                debug!(manager = %gate.name(), worker = seq, "worker thread started");
                gate.run_contained(item, || false);
                drop(slot);
            });
        })?;
        Ok(())
    }
}

impl ThreadManager for DedicatedThreadManager {
    fn do_work(&self, item: WorkItem) -> Result<(), CoreError> {
        if self.gate.max_threads() > 1 {
            return self.spawn(item);
        }
        // Inline runs still hold a slot so they wait out items started
        // under a higher cap.
        let slot = self.gate.acquire()?;
        tracing::dispatcher::with_default(self.gate.dispatch(), || {
            self.gate.run_contained(item, || false);
        });
        drop(slot);
        Ok(())
    }

    fn has_running_threads(&self) -> bool {
        self.gate.has_running()
    }

    fn abort_all(&self) {
        if self.gate.abort() {
            tracing::dispatcher::with_default(self.gate.dispatch(), || {
                info!(manager = %self.gate.name(), "abort requested; in-flight threads run to completion");
            });
        }
    }

    fn dispose(&self) {
        if self.gate.dispose() {
            tracing::dispatcher::with_default(self.gate.dispatch(), || {
                debug!(manager = %self.gate.name(), "dedicated thread manager disposed");
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

impl Drop for DedicatedThreadManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn wait_idle(manager: &DedicatedThreadManager) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.has_running_threads() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_runs_on_named_worker_thread() {
        let manager = DedicatedThreadManager::new(2).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        manager
            .do_work(Box::new(move || {
                let name = thread::current().name().map(str::to_owned);
                tx.send(name).unwrap();
            }))
            .unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(name.starts_with("crawl-worker-"));
    }

    #[test]
    fn test_single_thread_runs_inline() {
        let manager = DedicatedThreadManager::new(1).unwrap();
        let caller = thread::current().id();
        let ran_inline = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran_inline);
        manager
            .do_work(Box::new(move || {
                if thread::current().id() == caller {
                    flag.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .unwrap();
        assert_eq!(ran_inline.load(Ordering::SeqCst), 1);
        assert!(!manager.has_running_threads());
    }

    #[test]
    fn test_fault_is_contained_and_slot_released() {
        let manager = DedicatedThreadManager::new(2).unwrap();
        manager.do_work(Box::new(|| panic!("fetch exploded"))).unwrap();
        wait_idle(&manager);
        let stats = manager.stats();
        assert_eq!(stats.faulted, 1);
        assert_eq!(stats.running, 0);
    }

    #[test]
    fn test_stack_size_builder() {
        let manager = DedicatedThreadManager::new(2).unwrap().with_stack_size(256 * 1024);
        assert_eq!(manager.stack_size, Some(256 * 1024));
    }
}
