//! Tests for error types

use crawl_governor::core::{AppResult, CoreError};

#[test]
fn test_configuration_error() {
    let err = CoreError::Configuration("max threads must be between 1 and 100".to_string());
    assert_eq!(
        format!("{}", err),
        "configuration error: max threads must be between 1 and 100"
    );
}

#[test]
fn test_invalid_usage_error() {
    let err = CoreError::InvalidUsage("cannot do work after abort_all".to_string());
    assert_eq!(format!("{}", err), "invalid usage: cannot do work after abort_all");
}

#[test]
fn test_work_fault_error() {
    let err = CoreError::WorkFault("boom".to_string());
    assert_eq!(format!("{}", err), "work item faulted: boom");
}

#[test]
fn test_platform_unsupported_error() {
    let err = CoreError::PlatformUnsupported("no memory statistics".to_string());
    assert_eq!(format!("{}", err), "platform unsupported: no memory statistics");
}

#[test]
fn test_spawn_error_from_io() {
    let io = std::io::Error::new(std::io::ErrorKind::WouldBlock, "too many threads");
    let err: CoreError = io.into();
    assert!(matches!(err, CoreError::Spawn(_)));
    assert_eq!(format!("{}", err), "failed to spawn worker: too many threads");
}

#[test]
fn test_core_error_converts_to_app_result() {
    fn fails() -> AppResult<()> {
        Err(CoreError::InvalidUsage("disposed".to_string()))?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert!(err.downcast_ref::<CoreError>().is_some());
}
