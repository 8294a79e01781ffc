//! Shared utilities.

pub mod property_bag;
pub mod telemetry;

pub use property_bag::PropertyBag;
pub use telemetry::{init_tracing, LOG_ENV_VAR};
