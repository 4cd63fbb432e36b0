//! Tests for runtime helpers

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use deadline_invoke::core::Spawn;
use deadline_invoke::runtime::{load_batch, TokioSpawner};

#[test]
fn test_spawner_requires_runtime() {
    assert!(TokioSpawner::current().is_none());
}

#[tokio::test]
async fn test_spawner_runs_future() {
    let spawner = TokioSpawner::current().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&flag);
    spawner.spawn(async move {
        seen.store(true, Ordering::SeqCst);
    });
    for _ in 0..50 {
        if flag.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("spawned future never ran");
}

#[test]
fn test_load_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("task_batch.json");
    fs::write(
        &path,
        r#"[
            {"name": "a", "script_path": "a.py", "deadline_offset": 5, "est_runtime": 1},
            {"name": "b", "script_path": "b.py", "deadline": "2030-01-01T00:00:00Z", "est_runtime": 2, "args": [1, "x"]}
        ]"#,
    )
    .unwrap();

    let batch = load_batch(&path).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[1].args, vec!["1", "x"]);
    assert!(load_batch(dir.path().join("missing.json")).is_err());
}
