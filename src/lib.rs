//! # Crawl Governor
//!
//! Resource governance for a web crawler: how many fetches run at once, how
//! much memory the process may use, how often requests may be issued, and
//! how page content and URIs are fingerprinted for de-duplication.
//!
//! ## Key Features
//!
//! - **Bounded dispatch**: `ThreadManager` runs opaque work items with a
//!   capped degree of parallelism, blocking the submitter while saturated.
//!   Backends run each item on a dedicated OS thread or on a tokio blocking
//!   pool with cooperative cancellation.
//! - **Fault containment**: a panicking work item is logged and never takes
//!   the dispatcher down. Work that stops on cancellation is logged at debug.
//! - **Memory governance**: process memory sampled on a background thread
//!   and served from a cache, plus an "is this much more memory available"
//!   probe.
//! - **Rate limiting**: a rolling-window limiter where every permit comes
//!   back exactly one window after it was taken, and a per-domain registry
//!   of crawl delays built on it.
//! - **Fingerprinting**: 16-byte digests from MD5 or Murmur3 x64 128.
//!
//! ## Example
//!
//! ```rust,ignore
//! use crawl_governor::builders::build_core;
//! use crawl_governor::config::CoreConfig;
//! use crawl_governor::core::ThreadManagerExt;
//!
//! crawl_governor::util::init_tracing();
//! let core = build_core(&CoreConfig::from_env()?)?;
//!
//! for url in frontier {
//!     if !core.should_continue_crawling() {
//!         break;
//!     }
//!     core.domain_rate_limiter().rate_limit(host_of(&url))?;
//!     core.thread_manager().submit(move || crawl_page(url))?;
//! }
//! core.dispose();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Dispatch, memory, rate limiting and fingerprinting components.
pub mod core;
/// Configuration models for dispatch, memory, rate limits and hashing.
pub mod config;
/// Builders to construct governance components from configuration.
pub mod builders;
/// Runtime adapters backing the pooled dispatcher.
pub mod runtime;
/// Shared utilities.
pub mod util;
