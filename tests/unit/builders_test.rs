//! Tests for scheduler builders

use deadline_invoke::builders::{build_process_scheduler, build_scheduler};
use deadline_invoke::config::{MiddlewareConfig, SchedulerConfig};
use deadline_invoke::core::AdmissionPolicy;
use deadline_invoke::infra::{ProcessConfig, ProcessExecutor};
use deadline_invoke::runtime::TokioSpawner;

#[tokio::test]
async fn test_build_scheduler_applies_limits() {
    let cfg = SchedulerConfig {
        concurrency: 3,
        max_queue_depth: 7,
        admission_policy: AdmissionPolicy::Strict,
        ..SchedulerConfig::default()
    };
    let scheduler = build_scheduler(
        &cfg,
        ProcessExecutor::new(ProcessConfig::default()),
        TokioSpawner::current().unwrap(),
    )
    .unwrap();

    assert_eq!(scheduler.limits().concurrency, 3);
    assert_eq!(scheduler.limits().max_queue_depth, 7);
    assert_eq!(scheduler.limits().admission_policy, AdmissionPolicy::Strict);
    assert_eq!(scheduler.snapshot().queued, 0);
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let cfg = SchedulerConfig {
        concurrency: 0,
        ..SchedulerConfig::default()
    };
    let result = build_scheduler(
        &cfg,
        ProcessExecutor::new(ProcessConfig::default()),
        TokioSpawner::current().unwrap(),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_build_process_scheduler_opens_perf_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("performance_log.csv");
    let cfg = MiddlewareConfig {
        perf_log: Some(path.clone()),
        ..MiddlewareConfig::default()
    };

    let scheduler = build_process_scheduler(&cfg, TokioSpawner::current().unwrap()).unwrap();
    assert!(scheduler.limits().concurrency >= 1);
    assert!(std::fs::read_to_string(&path).unwrap().starts_with("timestamp,"));
}
