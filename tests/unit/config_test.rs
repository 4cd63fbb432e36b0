//! Tests for configuration loading and validation

use std::fs;

use deadline_invoke::config::{ConfigError, MiddlewareConfig, SchedulerConfig};
use deadline_invoke::core::AdmissionPolicy;

#[test]
fn test_full_json_config() {
    let cfg = MiddlewareConfig::from_json_str(
        r#"{
            "server": { "bind_addr": "0.0.0.0:8080" },
            "scheduler": {
                "concurrency": 4,
                "max_queue_depth": 64,
                "admission_policy": "strict",
                "max_retries": 2,
                "retention_secs": 120,
                "sweep_interval_ms": 250
            },
            "executor": { "interpreter": "bash", "script_root": "/srv/jobs" },
            "initial_batch": "task_batch.json",
            "perf_log": "performance_log.csv"
        }"#,
    )
    .unwrap();

    assert_eq!(cfg.server.bind_addr, "0.0.0.0:8080");
    let limits = cfg.scheduler.limits();
    assert_eq!(limits.concurrency, 4);
    assert_eq!(limits.max_queue_depth, 64);
    assert_eq!(limits.admission_policy, AdmissionPolicy::Strict);
    assert_eq!(limits.max_retries, 2);
    assert_eq!(limits.retention.as_secs(), 120);
    assert_eq!(cfg.scheduler.sweep_interval().as_millis(), 250);
    let process = cfg.executor.process_config();
    assert_eq!(process.interpreter, "bash");
    assert_eq!(process.script_root.unwrap().to_str(), Some("/srv/jobs"));
}

#[test]
fn test_partial_config_uses_defaults() {
    let cfg = MiddlewareConfig::from_json_str(r#"{ "scheduler": { "concurrency": 1 } }"#).unwrap();
    assert_eq!(cfg.scheduler.concurrency, 1);
    assert_eq!(cfg.scheduler.admission_policy, AdmissionPolicy::BestEffort);
    assert_eq!(cfg.executor.interpreter, "python3");
    assert!(cfg.initial_batch.is_none());
}

#[test]
fn test_zero_concurrency_invalid() {
    let err = MiddlewareConfig::from_json_str(r#"{ "scheduler": { "concurrency": 0 } }"#)
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_zero_queue_depth_invalid() {
    let cfg = SchedulerConfig {
        max_queue_depth: 0,
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_unknown_policy_is_parse_error() {
    let err = MiddlewareConfig::from_json_str(r#"{ "scheduler": { "admission_policy": "maybe" } }"#)
        .unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_from_file_and_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("middleware.json");
    fs::write(&path, r#"{ "server": { "bind_addr": "127.0.0.1:7000" } }"#).unwrap();
    assert_eq!(
        MiddlewareConfig::from_file(&path).unwrap().server.bind_addr,
        "127.0.0.1:7000"
    );

    let err = MiddlewareConfig::from_file(dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
