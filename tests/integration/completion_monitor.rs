//! Completion detection from per-chunk logs.

use super::test_utils::{t, Harness};
use pblsflow::artifact::StageId;
use pblsflow::completion::{CompletionDetector, StageStatus};
use std::time::Duration;

#[test]
fn test_stage_completes_when_every_log_exists() {
    let h = Harness::new();
    let detector = CompletionDetector::new(h.rt.store.as_ref(), &h.rt.layout);
    for chunk in 0..3 {
        h.put_log("T1", chunk, 4, 0);
    }
    assert!(!detector.is_stage_complete(&t("T1"), 0, 4).unwrap());
    h.put_log("T1", 3, 4, 0);
    assert!(detector.is_stage_complete(&t("T1"), 0, 4).unwrap());
    assert!(!detector.is_stage_complete(&t("T1"), 1, 4).unwrap());
}

#[test]
fn test_logs_for_another_run_do_not_count() {
    let h = Harness::new();
    h.put_log("T1", 0, 2, 0);
    h.put_log("T1", 1, 2, 0);
    h.put_log("T10", 0, 2, 0);
    let detector = CompletionDetector::new(h.rt.store.as_ref(), &h.rt.layout);
    assert_eq!(
        detector.stage_status(&StageId::new(t("T1"), 0, 4)).unwrap(),
        StageStatus::Pending { found: 0 }
    );
    assert_eq!(
        detector.stage_status(&StageId::new(t("T1"), 0, 2)).unwrap(),
        StageStatus::Complete
    );
}

#[test]
fn test_monitor_sweeps_until_all_stages_finish() {
    let h = Harness::new();
    h.put_log("T1", 0, 2, 0);
    h.put_log("T1", 1, 2, 0);
    h.put_log("T2", 0, 2, 0);

    let layout = h.rt.layout.clone();
    h.clock.set_hook(move |sleeps| {
        if sleeps == 3 {
            let dir = layout.logs(&t("T2"), 0);
            std::fs::write(dir.join("T2_1_2_iter0.log"), b"done").unwrap();
        }
    });

    let detector = CompletionDetector::new(h.rt.store.as_ref(), &h.rt.layout);
    let report = detector
        .monitor(
            [StageId::new(t("T1"), 0, 2), StageId::new(t("T2"), 0, 2)],
            &h.rt.timer(Duration::from_secs(300)),
        )
        .unwrap();

    assert_eq!(report.completed.len(), 2);
    assert!(report.anomalies.is_empty());
    assert_eq!(report.sweeps, 4);
    assert!(h
        .clock
        .sleeps()
        .iter()
        .all(|d| *d == Duration::from_secs(300)));
}
