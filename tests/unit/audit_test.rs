//! Tests for audit sinks

use deadline_invoke::core::{
    build_audit_event, AuditAction, AuditSink, InMemoryAuditSink, ScheduledTask, TaskDescriptor,
    TaskId, TaskRecord,
};

fn record(name: &str, deadline_ms: u128) -> TaskRecord {
    let task = ScheduledTask {
        id: TaskId::new_v4(),
        seq: 0,
        deadline_ms,
        submitted_at_ms: 1_000,
        descriptor: TaskDescriptor::new(name, "job.py", deadline_ms, 1.0, vec![]),
    };
    TaskRecord::pending(&task, false)
}

#[test]
fn test_in_memory_sink_is_bounded() {
    let mut sink = InMemoryAuditSink::new(2);
    let r = record("a", 10_000);
    for action in [AuditAction::Admit, AuditAction::Start, AuditAction::Complete] {
        sink.record(build_audit_event(action, &r));
    }
    assert_eq!(
        sink.actions_for(r.id),
        vec![AuditAction::Start, AuditAction::Complete]
    );
}

#[test]
fn test_event_id_names_task_and_action() {
    let r = record("a", 10_000);
    let event = build_audit_event(AuditAction::Miss, &r);
    assert!(event.event_id.starts_with(&r.id.to_string()));
    assert!(event.action.is_final());
    assert!(!AuditAction::Retry.is_final());
}
