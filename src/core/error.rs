//! Error types for governance components.

use thiserror::Error;

/// Errors produced by governance components.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Constructor or configuration argument outside its allowed range.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Operation invoked on a component that was aborted or disposed.
    #[error("invalid usage: {0}")]
    InvalidUsage(String),
    /// A dispatched work item failed. Contained at the dispatcher and logged.
    #[error("work item faulted: {0}")]
    WorkFault(String),
    /// The host cannot answer a memory probe.
    #[error("platform unsupported: {0}")]
    PlatformUnsupported(String),
    /// The OS refused to start a worker thread or runtime.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Self::InvalidUsage(msg.into())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
