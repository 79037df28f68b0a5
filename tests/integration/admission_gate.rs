//! Admission gate against a scripted queue.

use super::test_utils::{params, t, Harness};
use pblsflow::driver::SubmissionDriver;
use pblsflow::engine::{EngineCall, RecordingEngine};
use std::time::Duration;

#[test]
fn test_submission_waits_until_queue_drains() {
    let mut h = Harness::with_engine(RecordingEngine::with_depths([
        Some(12_000),
        Some(10_000),
        Some(9_999),
    ]));
    h.rt.settings.inter_submission_delay = Duration::ZERO;

    SubmissionDriver::new(&h.rt)
        .submit(&t("T1"), &params(4, 2))
        .unwrap();

    let calls = h.engine.calls();
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, EngineCall::QueueDepth))
            .count(),
        3
    );
    assert!(matches!(calls.last(), Some(EngineCall::Submit(_))));
    let waits: Vec<Duration> = h
        .clock
        .sleeps()
        .into_iter()
        .filter(|d| *d == Duration::from_secs(30))
        .collect();
    assert_eq!(waits.len(), 2);
}

#[test]
fn test_failed_depth_query_does_not_block() {
    let h = Harness::with_engine(RecordingEngine::with_depths([None]));
    let depth = h.rt.gate().wait_for_capacity(1);
    assert_eq!(depth, 0);
    assert_eq!(h.engine.depth_samples(), 1);
    assert_eq!(h.clock.sleep_count(), 0);
}

#[test]
fn test_cap_is_exclusive() {
    let h = Harness::with_engine(RecordingEngine::with_depths([Some(5), Some(4)]));
    assert_eq!(h.rt.gate().wait_for_capacity(5), 4);
    assert_eq!(h.engine.depth_samples(), 2);
}
