//! Tests for utility functions

use crawl_governor::util::{init_tracing, PropertyBag, LOG_ENV_VAR};

#[test]
fn test_log_env_var_name() {
    assert_eq!(LOG_ENV_VAR, "CRAWL_GOVERNOR_LOG");
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!("tracing initialized twice without panicking");
}

#[test]
fn test_property_bag_holds_mixed_types() {
    let mut bag = PropertyBag::new();
    assert!(bag.is_empty());

    assert!(bag.insert("depth", 3_u32));
    assert!(bag.insert("referrer", "https://example.com/".to_string()));
    assert!(!bag.insert("depth", 4_u32));

    assert_eq!(bag.len(), 2);
    assert_eq!(bag.get::<u32>("depth"), Some(&4));
    assert_eq!(
        bag.get::<String>("referrer").map(String::as_str),
        Some("https://example.com/")
    );
    assert!(bag.get::<u64>("depth").is_none());
    assert!(bag.get::<u32>("missing").is_none());
}

#[test]
fn test_property_bag_remove_requires_matching_type() {
    let mut bag = PropertyBag::new();
    bag.insert("retries", 2_usize);

    assert!(bag.remove::<String>("retries").is_none());
    assert!(bag.contains_key("retries"));
    assert_eq!(bag.remove::<usize>("retries"), Some(2));
    assert!(!bag.contains_key("retries"));
}

#[test]
fn test_property_bag_keys() {
    let mut bag = PropertyBag::new();
    bag.insert("a", 1_i32);
    bag.insert("b", 2_i32);
    let mut keys: Vec<_> = bag.keys().collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["a", "b"]);
}
