//! Runtime adapters used by the pooled dispatch backend.

#[cfg(feature = "tokio-runtime")]
pub mod tokio_pool;

#[cfg(feature = "tokio-runtime")]
pub use tokio_pool::TokioPool;
