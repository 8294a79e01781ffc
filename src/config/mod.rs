//! Configuration models for the governance components.

pub mod settings;

pub use settings::{
    CoreConfig, DispatchBackend, HashAlgorithm, HashConfig, MemoryConfig, RateLimitConfig,
    ThreadManagerConfig, ENV_PREFIX,
};
