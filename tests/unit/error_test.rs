//! Tests for rejection and scheduler error types

use deadline_invoke::core::{RejectReason, Rejection, SchedulerError, TaskId, TaskStatus};

#[test]
fn test_reason_codes_are_snake_case() {
    for (reason, code) in [
        (RejectReason::Malformed, "malformed"),
        (RejectReason::DeadlinePassed, "deadline_passed"),
        (RejectReason::Infeasible, "infeasible"),
        (RejectReason::QueueFull, "queue_full"),
    ] {
        assert_eq!(reason.as_str(), code);
        assert_eq!(serde_json::to_value(reason).unwrap(), code);
    }
}

#[test]
fn test_rejection_display_leads_with_reason() {
    let r = Rejection::queue_full(8);
    assert_eq!(r.reason, RejectReason::QueueFull);
    assert!(r.to_string().starts_with("queue_full: "));
    assert!(r.detail.contains('8'));
}

#[test]
fn test_infeasible_detail_names_both_times() {
    let r = Rejection::infeasible(2_000, 1_500);
    assert!(r.detail.contains("2000"));
    assert!(r.detail.contains("1500"));
}

#[test]
fn test_illegal_transition_display() {
    let err = SchedulerError::IllegalTransition {
        task_id: TaskId::nil(),
        from: TaskStatus::Succeeded,
        to: TaskStatus::Running,
    };
    let msg = err.to_string();
    assert!(msg.contains("Succeeded"));
    assert!(msg.contains("Running"));
}
