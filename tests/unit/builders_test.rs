//! Tests for builder modules

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crawl_governor::builders::{build_core, build_core_with};
use crawl_governor::config::{
    CoreConfig, DispatchBackend, HashAlgorithm, HashConfig, MemoryConfig, RateLimitConfig,
    ThreadManagerConfig,
};
use crawl_governor::core::{
    CoreError, HashGenerator, Md5HashGenerator, MemoryMonitor, MemoryProbe, Murmur3HashGenerator,
};

struct FixedMonitor(AtomicU64);

impl MemoryMonitor for FixedMonitor {
    fn current_usage_mb(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

struct FixedProbe(u64);

impl MemoryProbe for FixedProbe {
    fn try_reserve_mb(&self, size_mb: u64) -> Result<bool, CoreError> {
        Ok(size_mb <= self.0)
    }
}

fn memory_config(max_usage: u64, min_available: u64) -> CoreConfig {
    CoreConfig {
        memory: MemoryConfig {
            cache_expiration_secs: 1,
            max_memory_usage_mb: max_usage,
            min_available_memory_mb: min_available,
        },
        ..CoreConfig::default()
    }
}

#[test]
fn test_build_core_defaults() {
    let core = build_core(&CoreConfig::default()).unwrap();
    assert!(core.rate_limiter().is_none());
    assert_eq!(core.domain_rate_limiter().domain_count(), 0);
    assert!(!core.thread_manager().has_running_threads());
    assert!(core.should_continue_crawling());
    core.dispose();
    core.dispose();
}

#[test]
fn test_build_core_rejects_invalid_config() {
    let cfg = CoreConfig {
        thread_manager: ThreadManagerConfig {
            max_threads: 0,
            backend: DispatchBackend::Dedicated,
        },
        ..CoreConfig::default()
    };
    assert!(matches!(build_core(&cfg), Err(CoreError::Configuration(_))));
}

#[test]
fn test_build_core_wires_rate_limit_and_delay() {
    let cfg = CoreConfig {
        rate_limit: Some(RateLimitConfig {
            occurrences: 3,
            window_ms: 1_000,
        }),
        min_crawl_delay_ms: 100,
        ..CoreConfig::default()
    };
    let core = build_core(&cfg).unwrap();
    let limiter = core.rate_limiter().unwrap();
    assert_eq!(limiter.occurrences(), 3);
    assert_eq!(limiter.window().as_millis(), 1_000);
    assert_eq!(core.domain_rate_limiter().default_delay().as_millis(), 100);
}

#[test]
fn test_build_core_selects_hasher() {
    let input = b"https://example.com/";

    let md5 = build_core(&CoreConfig {
        hashing: HashConfig {
            algorithm: HashAlgorithm::Md5,
            murmur3_seed: 144,
        },
        ..CoreConfig::default()
    })
    .unwrap();
    assert_eq!(md5.hasher().generate_hash(input), Md5HashGenerator.generate_hash(input));

    let murmur = build_core(&CoreConfig {
        hashing: HashConfig {
            algorithm: HashAlgorithm::Murmur3,
            murmur3_seed: 9,
        },
        ..CoreConfig::default()
    })
    .unwrap();
    assert_eq!(
        murmur.hasher().generate_hash(input),
        Murmur3HashGenerator::with_seed(9).generate_hash(input)
    );
}

#[test]
fn test_build_core_pooled_backend() {
    let cfg = CoreConfig {
        thread_manager: ThreadManagerConfig {
            max_threads: 2,
            backend: DispatchBackend::Pooled,
        },
        ..CoreConfig::default()
    };
    let core = build_core(&cfg).unwrap();
    assert_eq!(core.thread_manager().max_threads(), 2);
}

#[test]
fn test_should_continue_crawling_respects_usage_limit() {
    let monitor = Arc::new(FixedMonitor(AtomicU64::new(500)));
    let core = build_core_with(
        &memory_config(400, 0),
        monitor,
        Box::new(FixedProbe(u64::MAX)),
    )
    .unwrap();
    assert!(!core.should_continue_crawling());

    let monitor = Arc::new(FixedMonitor(AtomicU64::new(400)));
    let core = build_core_with(
        &memory_config(400, 0),
        monitor,
        Box::new(FixedProbe(u64::MAX)),
    )
    .unwrap();
    assert!(core.should_continue_crawling());
}

#[test]
fn test_should_continue_crawling_respects_available_memory() {
    let monitor = Arc::new(FixedMonitor(AtomicU64::new(0)));
    let starved = build_core_with(&memory_config(0, 1_024), monitor, Box::new(FixedProbe(512)))
        .unwrap();
    assert!(!starved.should_continue_crawling());

    let monitor = Arc::new(FixedMonitor(AtomicU64::new(0)));
    let roomy = build_core_with(&memory_config(0, 1_024), monitor, Box::new(FixedProbe(4_096)))
        .unwrap();
    assert!(roomy.should_continue_crawling());
}

#[test]
fn test_zero_limits_disable_memory_checks() {
    let monitor = Arc::new(FixedMonitor(AtomicU64::new(u64::MAX / 2)));
    let core = build_core_with(&memory_config(0, 0), monitor, Box::new(FixedProbe(0))).unwrap();
    assert!(core.should_continue_crawling());
}
