//! Cancellation unwinds quietly: the process panic hook never runs for it.
//!
//! Kept in its own test binary because it replaces the global panic hook.

use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crawl_governor::core::{Cancelled, DedicatedThreadManager, ThreadManager, ThreadManagerExt};

#[test]
fn test_cancellation_bypasses_panic_hook() {
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hook_calls);
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let payload = panic::catch_unwind(|| Cancelled::raise());
    let manager = DedicatedThreadManager::new(1).unwrap();
    manager.submit(|| Cancelled::raise()).unwrap();
    let after_cancel = hook_calls.load(Ordering::SeqCst);
    manager.submit(|| panic!("fetch exploded")).unwrap();
    let after_fault = hook_calls.load(Ordering::SeqCst);

    panic::set_hook(previous);

    let payload = payload.unwrap_err();
    assert!(payload.downcast_ref::<Cancelled>().is_some());
    assert_eq!(after_cancel, 0);
    assert_eq!(after_fault, 1);

    let stats = manager.stats();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.faulted, 1);
}
