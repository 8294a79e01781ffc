//! Rolling-window rate limiting.
//!
//! A [`RateLimiter`] hands out at most `occurrences` permits. Every permit
//! granted by `wait_to_proceed` is scheduled to come back exactly `window`
//! after it was taken. Consequently no sliding interval of length `window`
//! sees more than `occurrences` completed waits.
//!
//! Scheduled releases are served by a [`ReleaseTimer`]: one background
//! thread with a deadline heap. A standalone limiter owns its timer; many
//! limiters (such as the per-domain ones) can share a single timer so the
//! thread count does not grow with the number of limiters. The timer thread
//! starts on the first scheduled release.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::core::CoreError;
use crate::util::telemetry::current_dispatch;

/// Longest accepted window.
pub const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

struct PermitState {
    available: usize,
    /// Release instants of checked-out permits, oldest first.
    releases: VecDeque<Instant>,
    disposed: bool,
}

impl PermitState {
    /// Return every permit whose release instant has passed.
    fn reclaim(&mut self, now: Instant) -> usize {
        let mut released = 0;
        while self.releases.front().is_some_and(|at| *at <= now) {
            self.releases.pop_front();
            self.available += 1;
            released += 1;
        }
        released
    }
}

struct Shared {
    occurrences: usize,
    window: Duration,
    state: Mutex<PermitState>,
    /// Signalled when permits come back or on dispose.
    permit_freed: Condvar,
}

impl Shared {
    fn release_due(&self, now: Instant) {
        let released = self.state.lock().reclaim(now);
        if released > 0 {
            trace!(released, "rate limit permits returned");
            self.permit_freed.notify_all();
        }
    }
}

struct Scheduled {
    at: Instant,
    seq: u64,
    target: Weak<Shared>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

#[derive(Default)]
struct TimerState {
    queue: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
    started: bool,
    stopped: bool,
}

#[derive(Default)]
struct TimerInner {
    state: Mutex<TimerState>,
    changed: Condvar,
}

/// Background thread returning rate limit permits when they fall due.
///
/// Dropping the last handle stops and joins the thread.
pub struct ReleaseTimer {
    inner: Arc<TimerInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ReleaseTimer {
    /// Create a timer. Its thread starts on the first scheduled release.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TimerInner::default()),
            thread: Mutex::new(None),
        }
    }

    /// Whether the timer thread has been started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.state.lock().started
    }

    /// Number of releases waiting to fall due.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    fn ensure_started(&self) -> Result<(), CoreError> {
        let mut thread_slot = self.thread.lock();
        if thread_slot.is_some() {
            return Ok(());
        }
        let dispatch = current_dispatch();
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("rate-limit-timer".into())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || run_timer(&inner));
            })?;
        self.inner.state.lock().started = true;
        *thread_slot = Some(handle);
        debug!("rate limit timer started");
        Ok(())
    }

    fn schedule(&self, at: Instant, target: Weak<Shared>) {
        let mut state = self.inner.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let sooner = state.queue.peek().is_none_or(|Reverse(next)| at < next.at);
        state.queue.push(Reverse(Scheduled { at, seq, target }));
        drop(state);
        if sooner {
            self.inner.changed.notify_one();
        }
    }
}

impl Default for ReleaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReleaseTimer {
    fn drop(&mut self) {
        self.inner.state.lock().stopped = true;
        self.inner.changed.notify_all();
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("rate limit timer panicked");
        }
    }
}

/// Timer loop: pop every due release, return the permits with the timer
/// lock released, then sleep until the next deadline or a new schedule.
fn run_timer(inner: &TimerInner) {
    let mut state = inner.state.lock();
    loop {
        if state.stopped {
            break;
        }
        let now = Instant::now();
        let mut due = Vec::new();
        while state
            .queue
            .peek()
            .is_some_and(|Reverse(next)| next.at <= now)
        {
            if let Some(Reverse(entry)) = state.queue.pop() {
                due.push(entry.target);
            }
        }
        if !due.is_empty() {
            MutexGuard::unlocked(&mut state, || {
                for target in due {
                    if let Some(shared) = target.upgrade() {
                        shared.release_due(now);
                    }
                }
            });
            continue;
        }
        match state.queue.peek().map(|Reverse(next)| next.at) {
            Some(next) => {
                let _ = inner.changed.wait_until(&mut state, next);
            }
            None => inner.changed.wait(&mut state),
        }
    }
    debug!("rate limit timer stopped");
}

/// At most `occurrences` completions of `wait_to_proceed` per `window`.
pub struct RateLimiter {
    shared: Arc<Shared>,
    timer: Mutex<Option<Arc<ReleaseTimer>>>,
}

impl RateLimiter {
    /// Create a limiter allowing `occurrences` operations per `window`, with
    /// a timer of its own.
    ///
    /// # Errors
    ///
    /// `CoreError::Configuration` if `occurrences` is zero or `window`
    /// exceeds 24 hours.
    pub fn new(occurrences: usize, window: Duration) -> Result<Self, CoreError> {
        Self::with_timer(occurrences, window, Arc::new(ReleaseTimer::new()))
    }

    /// Create a limiter whose releases are served by a shared `timer`.
    ///
    /// # Errors
    ///
    /// Same as [`RateLimiter::new`].
    pub fn with_timer(
        occurrences: usize,
        window: Duration,
        timer: Arc<ReleaseTimer>,
    ) -> Result<Self, CoreError> {
        if occurrences < 1 {
            return Err(CoreError::config("occurrences must be a positive integer"));
        }
        if window > MAX_WINDOW {
            return Err(CoreError::config(format!(
                "window must not exceed 24 hours, got {window:?}"
            )));
        }

        let shared = Arc::new(Shared {
            occurrences,
            window,
            state: Mutex::new(PermitState {
                available: occurrences,
                releases: VecDeque::with_capacity(occurrences),
                disposed: false,
            }),
            permit_freed: Condvar::new(),
        });

        debug!(occurrences, window_ms = window.as_millis(), "rate limiter created");
        Ok(Self {
            shared,
            timer: Mutex::new(Some(timer)),
        })
    }

    /// Create a limiter from a signed millisecond window, as found in
    /// configuration files.
    ///
    /// # Errors
    ///
    /// `CoreError::Configuration` for a negative window, plus the errors of
    /// [`RateLimiter::new`].
    pub fn from_millis(occurrences: usize, window_ms: i64) -> Result<Self, CoreError> {
        let window_ms = u64::try_from(window_ms).map_err(|_| {
            CoreError::config(format!("window must not be negative, got {window_ms}ms"))
        })?;
        Self::new(occurrences, Duration::from_millis(window_ms))
    }

    /// Permits per window.
    #[must_use]
    pub fn occurrences(&self) -> usize {
        self.shared.occurrences
    }

    /// Window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.shared.window
    }

    /// Permits that could be taken right now without waiting.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        let mut state = self.shared.state.lock();
        state.reclaim(Instant::now());
        state.available
    }

    /// Block until a permit is available and take it.
    ///
    /// # Errors
    ///
    /// - `CoreError::InvalidUsage` if the limiter is or becomes disposed
    /// - `CoreError::Spawn` if the timer thread cannot be started
    pub fn wait_to_proceed(&self) -> Result<(), CoreError> {
        self.acquire(None).map(|_| ())
    }

    /// Wait at most `timeout` for a permit. Returns whether one was taken.
    ///
    /// # Errors
    ///
    /// Same as [`RateLimiter::wait_to_proceed`].
    pub fn wait_to_proceed_timeout(&self, timeout: Duration) -> Result<bool, CoreError> {
        self.acquire(Instant::now().checked_add(timeout))
    }

    /// Wait at most `timeout_ms` milliseconds for a permit.
    ///
    /// # Errors
    ///
    /// - `CoreError::Configuration` if `timeout_ms` is negative
    /// - otherwise the errors of [`RateLimiter::wait_to_proceed`]
    pub fn wait_to_proceed_millis(&self, timeout_ms: i64) -> Result<bool, CoreError> {
        let timeout_ms = u64::try_from(timeout_ms).map_err(|_| {
            CoreError::config(format!("timeout must not be negative, got {timeout_ms}ms"))
        })?;
        self.wait_to_proceed_timeout(Duration::from_millis(timeout_ms))
    }

    /// Take a permit, waiting until `deadline` (forever if `None`).
    fn acquire(&self, deadline: Option<Instant>) -> Result<bool, CoreError> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        loop {
            if state.disposed {
                return Err(CoreError::usage("rate limiter has been disposed"));
            }
            let now = Instant::now();
            state.reclaim(now);
            if state.available > 0 {
                // Dispose takes the timer only after setting `disposed` under
                // the state lock, so it is still present here.
                let timer = self
                    .timer
                    .lock()
                    .clone()
                    .ok_or_else(|| CoreError::usage("rate limiter has been disposed"))?;
                timer.ensure_started()?;
                let release_at = now + shared.window;
                state.available -= 1;
                state.releases.push_back(release_at);
                drop(state);
                timer.schedule(release_at, Arc::downgrade(shared));
                trace!("rate limit permit granted");
                return Ok(true);
            }
            match deadline {
                None => shared.permit_freed.wait(&mut state),
                Some(deadline) => {
                    if now >= deadline {
                        return Ok(false);
                    }
                    let _ = shared.permit_freed.wait_until(&mut state, deadline);
                }
            }
        }
    }

    /// Wake all waiters, who then fail, and detach from the timer. A timer
    /// owned by this limiter alone is stopped. Safe to call repeatedly and
    /// from any thread.
    pub fn dispose(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
        }
        self.shared.permit_freed.notify_all();
        drop(self.timer.lock().take());
        debug!("rate limiter disposed");
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.dispose();
    }
}
