//! Per-domain crawl delays built on [`RateLimiter`].
//!
//! Each domain gets a limiter allowing one request per crawl delay. Domain
//! keys are opaque strings; callers pass whatever authority they extracted
//! from the URI they are about to fetch.
//!
//! All limiters of one registry share a single [`ReleaseTimer`], so the
//! number of background threads stays fixed however many domains are seen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::core::{CoreError, RateLimiter, ReleaseTimer};

/// Registry of one-request-per-delay limiters keyed by domain.
pub struct DomainRateLimiter {
    default_delay: Duration,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
    timer: Arc<ReleaseTimer>,
    disposed: AtomicBool,
}

impl DomainRateLimiter {
    /// Create a registry whose unknown domains get `min_crawl_delay_ms`.
    /// A zero default leaves unregistered domains unthrottled.
    #[must_use]
    pub fn new(min_crawl_delay_ms: u64) -> Self {
        Self {
            default_delay: Duration::from_millis(min_crawl_delay_ms),
            limiters: Mutex::new(HashMap::new()),
            timer: Arc::new(ReleaseTimer::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Default delay for domains without their own limiter.
    #[must_use]
    pub const fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Block until a request to `domain` is allowed.
    ///
    /// A caller waiting on a limiter that [`add_or_update_domain`] or
    /// [`remove_domain`] replaces moves on to whatever now governs the
    /// domain.
    ///
    /// [`add_or_update_domain`]: Self::add_or_update_domain
    /// [`remove_domain`]: Self::remove_domain
    ///
    /// # Errors
    ///
    /// - `CoreError::Spawn` if the timer thread cannot be started
    /// - `CoreError::InvalidUsage` if the registry is or becomes disposed
    pub fn rate_limit(&self, domain: &str) -> Result<(), CoreError> {
        loop {
            let Some(limiter) = self.limiter_for(domain)? else {
                return Ok(());
            };
            match limiter.wait_to_proceed() {
                Err(CoreError::InvalidUsage(_)) if self.was_replaced(domain, &limiter) => {
                    trace!(domain, "domain limiter replaced while waiting");
                }
                result => return result,
            }
        }
    }

    /// Register `domain` with `crawl_delay_ms`, never below the default. An
    /// existing registration is left as is.
    ///
    /// # Errors
    ///
    /// - `CoreError::Configuration` if `crawl_delay_ms` is zero
    /// - `CoreError::InvalidUsage` if the registry has been disposed
    pub fn add_domain(&self, domain: &str, crawl_delay_ms: u64) -> Result<(), CoreError> {
        let delay = self.effective_delay(crawl_delay_ms)?;
        let mut limiters = self.limiters.lock();
        self.check_live()?;
        if !limiters.contains_key(domain) {
            limiters.insert(domain.to_owned(), self.new_limiter(delay)?);
            debug!(domain, delay_ms = delay.as_millis(), "domain rate limit added");
        }
        Ok(())
    }

    /// Register or replace the limiter for `domain`. Callers blocked on the
    /// previous limiter continue on the new one.
    ///
    /// # Errors
    ///
    /// - `CoreError::Configuration` if `crawl_delay_ms` is zero
    /// - `CoreError::InvalidUsage` if the registry has been disposed
    pub fn add_or_update_domain(&self, domain: &str, crawl_delay_ms: u64) -> Result<(), CoreError> {
        let delay = self.effective_delay(crawl_delay_ms)?;
        let limiter = self.new_limiter(delay)?;
        let previous = {
            let mut limiters = self.limiters.lock();
            self.check_live()?;
            limiters.insert(domain.to_owned(), limiter)
        };
        if let Some(previous) = previous {
            previous.dispose();
        }
        info!(domain, delay_ms = delay.as_millis(), "domain rate limit set");
        Ok(())
    }

    /// Forget `domain`, disposing its limiter. Returns whether it was known.
    pub fn remove_domain(&self, domain: &str) -> bool {
        let removed = self.limiters.lock().remove(domain);
        removed.is_some_and(|limiter| {
            limiter.dispose();
            true
        })
    }

    /// Number of domains with a limiter.
    #[must_use]
    pub fn domain_count(&self) -> usize {
        self.limiters.lock().len()
    }

    /// Dispose every limiter and clear the registry. Later calls to
    /// [`rate_limit`](Self::rate_limit) fail.
    pub fn dispose(&self) {
        let drained: Vec<_> = {
            let mut limiters = self.limiters.lock();
            self.disposed.store(true, Ordering::Release);
            limiters.drain().collect()
        };
        for (_, limiter) in drained {
            limiter.dispose();
        }
    }

    fn effective_delay(&self, crawl_delay_ms: u64) -> Result<Duration, CoreError> {
        if crawl_delay_ms < 1 {
            return Err(CoreError::config("crawl delay must be at least 1ms"));
        }
        Ok(Duration::from_millis(crawl_delay_ms).max(self.default_delay))
    }

    fn new_limiter(&self, delay: Duration) -> Result<Arc<RateLimiter>, CoreError> {
        RateLimiter::with_timer(1, delay, Arc::clone(&self.timer)).map(Arc::new)
    }

    fn check_live(&self) -> Result<(), CoreError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(CoreError::usage("domain rate limiter has been disposed"));
        }
        Ok(())
    }

    /// Whether `limiter` no longer governs `domain` in a live registry.
    fn was_replaced(&self, domain: &str, limiter: &Arc<RateLimiter>) -> bool {
        let limiters = self.limiters.lock();
        !self.disposed.load(Ordering::Acquire)
            && limiters
                .get(domain)
                .is_none_or(|current| !Arc::ptr_eq(current, limiter))
    }

    fn limiter_for(&self, domain: &str) -> Result<Option<Arc<RateLimiter>>, CoreError> {
        let mut limiters = self.limiters.lock();
        self.check_live()?;
        if let Some(limiter) = limiters.get(domain) {
            return Ok(Some(Arc::clone(limiter)));
        }
        if self.default_delay.is_zero() {
            return Ok(None);
        }
        let limiter = self.new_limiter(self.default_delay)?;
        limiters.insert(domain.to_owned(), Arc::clone(&limiter));
        Ok(Some(limiter))
    }
}

impl Drop for DomainRateLimiter {
    fn drop(&mut self) {
        self.dispose();
    }
}
