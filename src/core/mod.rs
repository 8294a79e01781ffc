//! Governance components: dispatch, memory, rate limiting and fingerprinting.

pub mod domain_rate_limiter;
pub mod error;
pub mod hash;
pub mod memory;
pub mod rate_limiter;
pub mod thread_manager;

pub use domain_rate_limiter::DomainRateLimiter;
pub use error::{AppResult, CoreError};
pub use hash::{
    encode_single_byte, HashDigest, HashGenerator, Md5HashGenerator, Murmur3HashGenerator,
    DEFAULT_MURMUR3_SEED,
};
pub use memory::{
    CachedMemoryMonitor, MemoryManager, MemoryMonitor, MemoryProbe, ProcessMemoryMonitor,
    SystemMemoryProbe, DEFAULT_CACHE_EXPIRATION_SECS,
};
pub use rate_limiter::{RateLimiter, ReleaseTimer, MAX_WINDOW};
#[cfg(feature = "tokio-runtime")]
pub use thread_manager::PooledThreadManager;
pub use thread_manager::{
    validate_max_threads, Cancelled, DedicatedThreadManager, DispatchStats, ThreadManager,
    ThreadManagerExt, WorkItem, MAX_THREADS, MIN_THREADS,
};
