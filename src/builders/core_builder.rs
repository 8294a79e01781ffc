//! Assemble a [`CrawlCore`] from a [`CoreConfig`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{CoreConfig, DispatchBackend, HashAlgorithm};
use crate::core::{
    CachedMemoryMonitor, CoreError, DedicatedThreadManager, DomainRateLimiter, HashGenerator,
    Md5HashGenerator, MemoryManager, MemoryMonitor, MemoryProbe, Murmur3HashGenerator,
    ProcessMemoryMonitor, RateLimiter, SystemMemoryProbe, ThreadManager,
};

/// The governance components a crawler consults on every step.
pub struct CrawlCore {
    thread_manager: Box<dyn ThreadManager>,
    memory_manager: MemoryManager,
    rate_limiter: Option<RateLimiter>,
    domain_rate_limiter: DomainRateLimiter,
    hasher: Box<dyn HashGenerator>,
    max_memory_usage_mb: u64,
    min_available_memory_mb: u64,
}

impl CrawlCore {
    /// Dispatcher for crawl work items.
    #[must_use]
    pub fn thread_manager(&self) -> &dyn ThreadManager {
        self.thread_manager.as_ref()
    }

    /// Memory admission control.
    #[must_use]
    pub const fn memory_manager(&self) -> &MemoryManager {
        &self.memory_manager
    }

    /// Global rate limiter, if one is configured.
    #[must_use]
    pub const fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.rate_limiter.as_ref()
    }

    /// Per-domain crawl delays.
    #[must_use]
    pub const fn domain_rate_limiter(&self) -> &DomainRateLimiter {
        &self.domain_rate_limiter
    }

    /// Fingerprint strategy.
    #[must_use]
    pub fn hasher(&self) -> &dyn HashGenerator {
        self.hasher.as_ref()
    }

    /// Whether the memory limits still allow crawling.
    #[must_use]
    pub fn should_continue_crawling(&self) -> bool {
        if self.max_memory_usage_mb > 0 {
            let limit = i64::try_from(self.max_memory_usage_mb).unwrap_or(i64::MAX);
            if self.memory_manager.is_current_usage_above(limit) {
                info!(
                    usage_mb = self.memory_manager.current_usage_mb(),
                    limit_mb = self.max_memory_usage_mb,
                    "memory usage above limit"
                );
                return false;
            }
        }
        if self.min_available_memory_mb > 0 {
            let wanted = i64::try_from(self.min_available_memory_mb).unwrap_or(i64::MAX);
            if !self.memory_manager.is_space_available(wanted) {
                info!(wanted_mb = self.min_available_memory_mb, "not enough memory available");
                return false;
            }
        }
        true
    }

    /// Dispose every component. Safe to call repeatedly.
    pub fn dispose(&self) {
        self.thread_manager.dispose();
        if let Some(limiter) = &self.rate_limiter {
            limiter.dispose();
        }
        self.domain_rate_limiter.dispose();
        self.memory_manager.dispose();
        debug!("crawl core disposed");
    }
}

impl Drop for CrawlCore {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Build every component described by `cfg`, sampling this process's memory.
///
/// # Errors
///
/// - `CoreError::Configuration` if `cfg` is invalid
/// - `CoreError::Spawn` if a worker, timer or refresh thread cannot start
pub fn build_core(cfg: &CoreConfig) -> Result<CrawlCore, CoreError> {
    build_core_with(
        cfg,
        Arc::new(ProcessMemoryMonitor::new()),
        Box::new(SystemMemoryProbe::new()),
    )
}

/// Build every component described by `cfg` over a caller-supplied memory
/// source and probe. The monitor is wrapped in a [`CachedMemoryMonitor`].
///
/// # Errors
///
/// Same as [`build_core`].
pub fn build_core_with(
    cfg: &CoreConfig,
    monitor: Arc<dyn MemoryMonitor>,
    probe: Box<dyn MemoryProbe>,
) -> Result<CrawlCore, CoreError> {
    cfg.validate()
        .map_err(|e| CoreError::config(format!("config invalid: {e}")))?;

    let thread_manager = build_thread_manager(cfg)?;
    let cached = CachedMemoryMonitor::new(monitor, cfg.memory.cache_expiration_secs)?;
    let memory_manager = MemoryManager::with_probe(Arc::new(cached), probe);
    let rate_limiter = cfg
        .rate_limit
        .as_ref()
        .map(|rl| RateLimiter::from_millis(rl.occurrences, rl.window_ms))
        .transpose()?;
    let domain_rate_limiter = DomainRateLimiter::new(cfg.min_crawl_delay_ms);
    let hasher: Box<dyn HashGenerator> = match cfg.hashing.algorithm {
        HashAlgorithm::Md5 => Box::new(Md5HashGenerator),
        HashAlgorithm::Murmur3 => Box::new(Murmur3HashGenerator::with_seed(cfg.hashing.murmur3_seed)),
    };

    info!(
        max_threads = cfg.thread_manager.max_threads,
        backend = ?cfg.thread_manager.backend,
        hashing = ?cfg.hashing.algorithm,
        rate_limited = rate_limiter.is_some(),
        "crawl core built"
    );

    Ok(CrawlCore {
        thread_manager,
        memory_manager,
        rate_limiter,
        domain_rate_limiter,
        hasher,
        max_memory_usage_mb: cfg.memory.max_memory_usage_mb,
        min_available_memory_mb: cfg.memory.min_available_memory_mb,
    })
}

fn build_thread_manager(cfg: &CoreConfig) -> Result<Box<dyn ThreadManager>, CoreError> {
    let max_threads = cfg.thread_manager.max_threads;
    match cfg.thread_manager.backend {
        DispatchBackend::Dedicated => Ok(Box::new(DedicatedThreadManager::new(max_threads)?)),
        #[cfg(feature = "tokio-runtime")]
        DispatchBackend::Pooled => Ok(Box::new(crate::core::PooledThreadManager::new(
            max_threads,
        )?)),
        #[cfg(not(feature = "tokio-runtime"))]
        DispatchBackend::Pooled => Err(CoreError::config(
            "pooled backend requires the `tokio-runtime` feature",
        )),
    }
}
