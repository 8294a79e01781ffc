//! Process memory measurement and memory-based admission control.
//!
//! - [`ProcessMemoryMonitor`] samples the resident memory of this process.
//! - [`CachedMemoryMonitor`] memoizes a sample and refreshes it on a
//!   background thread so frequent callers never measure on their own thread.
//! - [`MemoryManager`] turns a monitor plus a [`MemoryProbe`] into the two
//!   predicates a crawler consults before starting more work.

mod cached;
mod manager;
mod monitor;

pub use cached::{CachedMemoryMonitor, DEFAULT_CACHE_EXPIRATION_SECS};
pub use manager::{MemoryManager, MemoryProbe, SystemMemoryProbe};
pub use monitor::{MemoryMonitor, ProcessMemoryMonitor, BYTES_PER_MB};
