//! Tests for configuration validation

use std::collections::HashMap;
use std::io::Write;

use crawl_governor::config::{
    CoreConfig, DispatchBackend, HashAlgorithm, RateLimitConfig, ThreadManagerConfig, ENV_PREFIX,
};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), (*v).to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn test_default_config_is_valid() {
    let cfg = CoreConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.thread_manager.backend, DispatchBackend::Dedicated);
    assert_eq!(cfg.memory.cache_expiration_secs, 5);
    assert_eq!(cfg.memory.max_memory_usage_mb, 0);
    assert_eq!(cfg.memory.min_available_memory_mb, 0);
    assert_eq!(cfg.min_crawl_delay_ms, 0);
    assert_eq!(cfg.hashing.algorithm, HashAlgorithm::Murmur3);
    assert_eq!(cfg.hashing.murmur3_seed, 144);
}

#[test]
fn test_thread_manager_config_bounds() {
    for max_threads in [1, 50, 100] {
        let cfg = CoreConfig {
            thread_manager: ThreadManagerConfig {
                max_threads,
                backend: DispatchBackend::Dedicated,
            },
            ..CoreConfig::default()
        };
        assert!(cfg.validate().is_ok(), "max_threads {max_threads} should be valid");
    }
    for max_threads in [0, 101] {
        let cfg = CoreConfig {
            thread_manager: ThreadManagerConfig {
                max_threads,
                backend: DispatchBackend::Dedicated,
            },
            ..CoreConfig::default()
        };
        assert!(cfg.validate().is_err(), "max_threads {max_threads} should be invalid");
    }
}

#[test]
fn test_rate_limit_config_validation() {
    let valid = RateLimitConfig {
        occurrences: 1,
        window_ms: 0,
    };
    assert!(valid.validate().is_ok());

    let no_occurrences = RateLimitConfig {
        occurrences: 0,
        window_ms: 1_000,
    };
    assert!(no_occurrences.validate().is_err());

    let negative = RateLimitConfig {
        occurrences: 1,
        window_ms: -1,
    };
    assert!(negative.validate().is_err());

    let too_long = RateLimitConfig {
        occurrences: 1,
        window_ms: 24 * 60 * 60 * 1_000 + 1,
    };
    assert!(too_long.validate().is_err());
}

#[test]
fn test_json_parsing_with_partial_sections() {
    let cfg = CoreConfig::from_json_str(
        r#"{
            "thread_manager": { "max_threads": 4, "backend": "pooled" },
            "rate_limit": { "occurrences": 10, "window_ms": 1000 },
            "hashing": { "algorithm": "md5" }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.thread_manager.max_threads, 4);
    assert_eq!(cfg.thread_manager.backend, DispatchBackend::Pooled);
    assert_eq!(cfg.rate_limit.as_ref().map(|r| r.occurrences), Some(10));
    assert_eq!(cfg.hashing.algorithm, HashAlgorithm::Md5);
    assert_eq!(cfg.hashing.murmur3_seed, 144);
    assert_eq!(cfg.memory.cache_expiration_secs, 5);
}

#[test]
fn test_json_rejects_invalid_values() {
    assert!(CoreConfig::from_json_str(r#"{"thread_manager": {"max_threads": 0}}"#).is_err());
    assert!(CoreConfig::from_json_str(r#"{"hashing": {"algorithm": "sha256"}}"#).is_err());
    assert!(CoreConfig::from_json_str(r#"{"thread_manager": {"max_threads": -5}}"#).is_err());
    assert!(CoreConfig::from_json_str("not json").is_err());
}

#[test]
fn test_json_file_round_trip() {
    let cfg = CoreConfig {
        min_crawl_delay_ms: 250,
        ..CoreConfig::default()
    };
    let path = std::env::temp_dir().join(format!("crawl-governor-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(serde_json::to_string_pretty(&cfg).unwrap().as_bytes())
        .unwrap();
    drop(file);

    let loaded = CoreConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded, cfg);
}

#[test]
fn test_json_file_missing_reports_path() {
    let err = CoreConfig::from_json_file("/definitely/not/here.json").unwrap_err();
    assert!(format!("{err:#}").contains("/definitely/not/here.json"));
}

#[test]
fn test_environment_overrides() {
    let cfg = CoreConfig::from_lookup(env(&[
        ("MAX_THREADS", "8"),
        ("BACKEND", "dedicated"),
        ("CACHE_EXPIRATION_SECS", "2"),
        ("MAX_MEMORY_MB", "2048"),
        ("MIN_AVAILABLE_MEMORY_MB", "256"),
        ("MIN_CRAWL_DELAY_MS", "500"),
        ("HASH", "MURMUR3"),
        ("MURMUR3_SEED", "7"),
    ]))
    .unwrap();
    assert_eq!(cfg.thread_manager.max_threads, 8);
    assert_eq!(cfg.memory.cache_expiration_secs, 2);
    assert_eq!(cfg.memory.max_memory_usage_mb, 2048);
    assert_eq!(cfg.memory.min_available_memory_mb, 256);
    assert_eq!(cfg.min_crawl_delay_ms, 500);
    assert_eq!(cfg.hashing.murmur3_seed, 7);
    assert!(cfg.rate_limit.is_none());
}

#[test]
fn test_environment_rejects_negative_threads() {
    assert!(CoreConfig::from_lookup(env(&[("MAX_THREADS", "-5")])).is_err());
}

#[test]
fn test_environment_rejects_half_rate_limit() {
    let err = CoreConfig::from_lookup(env(&[("RATE_WINDOW_MS", "1000")])).unwrap_err();
    assert!(err.to_string().contains("RATE_OCCURRENCES"));
}

#[test]
fn test_environment_rejects_invalid_rate_limit() {
    assert!(CoreConfig::from_lookup(env(&[
        ("RATE_OCCURRENCES", "0"),
        ("RATE_WINDOW_MS", "1000"),
    ]))
    .is_err());
}
