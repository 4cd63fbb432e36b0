//! Tests for utility helpers

use deadline_invoke::util::{init_tracing, init_tracing_with, now_ms};

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing_with("debug");
    tracing::info!("tracing initialised twice without panicking");
}

#[test]
fn test_now_ms_is_after_2020() {
    let a = now_ms();
    assert!(now_ms() >= a);
    assert!(a > 1_577_836_800_000);
}
