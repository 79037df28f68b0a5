//! Fan-in over a real directory tree.

use super::test_utils::{names_in, t, Harness};
use pblsflow::artifact::StageId;
use pblsflow::error::OrchestratorError;
use pblsflow::fanin::{FanInAggregator, FanInOutcome, FanInStatus};
use std::time::Duration;

fn stage(iteration: u32, total: u32) -> StageId {
    StageId::new(t("T1"), iteration, total)
}

#[test]
fn test_waits_for_every_chunk_then_moves_them() {
    let h = Harness::new();
    for chunk in 0..3 {
        h.put_output("T1", chunk, 4, 0);
    }
    let layout = h.rt.layout.clone();
    h.clock.set_hook(move |sleeps| {
        if sleeps == 2 {
            super::test_utils::put_output_at(&layout, "T1", 3, 4, 0);
        }
    });

    let fan_in = FanInAggregator::new(&h.rt);
    let timer = h.rt.timer(Duration::from_secs(60));
    let outcome = fan_in.await_chunks(&stage(0, 4), &timer).unwrap();

    let archive = h.rt.layout.archive(&t("T1"), 0);
    assert_eq!(
        outcome,
        FanInOutcome::Transferred {
            count: 4,
            destination: archive.clone()
        }
    );
    assert_eq!(h.clock.sleep_count(), 2);
    assert_eq!(names_in(&archive).len(), 4);
    assert!(names_in(&h.rt.layout.receiving(&t("T1"))).is_empty());
}

#[test]
fn test_other_iterations_do_not_count() {
    let h = Harness::new();
    for chunk in 0..4 {
        h.put_output("T1", chunk, 4, 1);
    }
    h.put_output("T1", 0, 4, 0);
    let status = FanInAggregator::new(&h.rt).status(&stage(0, 4)).unwrap();
    assert_eq!(status, FanInStatus::Pending { found: 1 });
}

#[test]
fn test_duplicate_chunk_is_an_overcount() {
    let h = Harness::new();
    for chunk in 0..2 {
        h.put_output("T1", chunk, 2, 0);
    }
    let receiving = h.rt.layout.receiving(&t("T1"));
    std::fs::write(receiving.join("joboutput_T1_01_2_iter0.tar.gz"), b"dup").unwrap();

    let fan_in = FanInAggregator::new(&h.rt);
    let outcome = fan_in
        .await_chunks(&stage(0, 2), &h.rt.timer(Duration::from_secs(60)))
        .unwrap();
    assert_eq!(outcome, FanInOutcome::Overcount { found: 3 });
    assert_eq!(names_in(&receiving).len(), 3);
    assert!(names_in(&h.rt.layout.archive(&t("T1"), 0)).is_empty());
}

#[test]
fn test_mismatched_chunk_total_is_fatal() {
    let h = Harness::new();
    h.put_output("T1", 0, 8, 0);
    let err = FanInAggregator::new(&h.rt)
        .status(&stage(0, 4))
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ChunkCountMismatch { found: 8, .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_second_wait_sees_archived_outputs() {
    let h = Harness::new();
    for chunk in 0..2 {
        h.put_output("T1", chunk, 2, 0);
    }
    let fan_in = FanInAggregator::new(&h.rt);
    let timer = h.rt.timer(Duration::from_secs(60));
    fan_in.await_chunks(&stage(0, 2), &timer).unwrap();
    let again = fan_in.await_chunks(&stage(0, 2), &timer).unwrap();
    assert!(matches!(again, FanInOutcome::AlreadyTransferred { .. }));
}
