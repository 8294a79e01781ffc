//! Builders that assemble governance components from configuration.

pub mod core_builder;

pub use core_builder::{build_core, build_core_with, CrawlCore};
