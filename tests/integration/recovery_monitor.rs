//! Recovery scans over a real graph directory.

use super::test_utils::{params, t, Harness};
use pblsflow::engine::RecordingEngine;
use pblsflow::error::OrchestratorError;
use pblsflow::recovery::RecoveryMonitor;
use std::time::Duration;

#[test]
fn test_only_newest_artifact_is_acted_on() {
    let h = Harness::new();
    h.track("T1", &params(4, 2));
    for sequence in 1..=3 {
        h.put_rescue("T1", 0, 4, sequence);
    }

    let mut monitor = RecoveryMonitor::new(&h.rt);
    let report = monitor.scan(&[t("T1")]).unwrap();
    assert_eq!(report.resubmitted.len(), 1);
    assert_eq!(report.resubmitted[0].sequence, 3);

    let resubmissions = h.engine.resubmissions();
    assert_eq!(resubmissions.len(), 1);
    assert!(resubmissions[0]
        .rescue
        .ends_with("graphs/T1/T1_iter0_N4.dag.rescue003"));
    assert!(resubmissions[0].graph.ends_with("graphs/T1/T1_iter0_N4.dag"));

    assert!(monitor.scan(&[t("T1")]).unwrap().resubmitted.is_empty());
    let record = h.rt.ledger.get(&t("T1")).unwrap().unwrap();
    assert_eq!(record.resubmissions.len(), 1);
}

#[test]
fn test_restart_does_not_repeat_resubmission() {
    let h = Harness::new();
    h.track("T1", &params(4, 2));
    h.put_rescue("T1", 0, 4, 1);
    RecoveryMonitor::new(&h.rt).scan(&[t("T1")]).unwrap();

    // Fresh in-memory state; the ledger remembers.
    let report = RecoveryMonitor::new(&h.rt).scan(&[t("T1")]).unwrap();
    assert_eq!(report.new_artifacts(), 0);
    assert_eq!(h.engine.resubmissions().len(), 1);

    h.put_rescue("T1", 0, 4, 2);
    let report = RecoveryMonitor::new(&h.rt).scan(&[t("T1")]).unwrap();
    assert_eq!(report.resubmitted.len(), 1);
}

#[test]
fn test_untracked_targets_are_ignored() {
    let h = Harness::new();
    h.put_rescue("T2", 0, 4, 1);
    let report = RecoveryMonitor::new(&h.rt).scan(&[t("T2")]).unwrap();
    assert_eq!(report.new_artifacts(), 0);
    assert!(h.engine.resubmissions().is_empty());
}

#[test]
fn test_repeated_failures_abandon_the_artifact() {
    let engine = RecordingEngine::new();
    engine.fail_resubmits(5);
    let h = Harness::with_engine(engine);
    h.track("T1", &params(4, 2));
    h.put_rescue("T1", 0, 4, 1);

    let mut monitor = RecoveryMonitor::new(&h.rt);
    assert_eq!(monitor.scan(&[t("T1")]).unwrap().failed.len(), 1);
    assert_eq!(monitor.scan(&[t("T1")]).unwrap().failed.len(), 1);
    let third = monitor.scan(&[t("T1")]).unwrap();
    assert_eq!(third.abandoned, vec!["T1_iter0_N4.dag.rescue001".to_string()]);
    assert_eq!(monitor.scan(&[t("T1")]).unwrap().new_artifacts(), 0);

    let record = h.rt.ledger.get(&t("T1")).unwrap().unwrap();
    assert!(record.resubmissions.is_empty());
    assert!(record.has_acted_on("T1_iter0_N4.dag.rescue001"));
}

#[test]
fn test_chunk_total_mismatch_is_fatal() {
    let h = Harness::new();
    h.track("T1", &params(4, 2));
    h.put_rescue("T1", 0, 8, 1);
    let err = RecoveryMonitor::new(&h.rt).scan(&[t("T1")]).unwrap_err();
    assert!(matches!(err, OrchestratorError::ChunkCountMismatch { .. }));
}

#[test]
fn test_sweep_runs_until_a_quiet_pass() {
    let h = Harness::new();
    h.track("T1", &params(4, 2));
    h.track("T2", &params(4, 2));
    h.put_rescue("T1", 0, 4, 1);
    h.put_rescue("T2", 1, 4, 1);

    let mut monitor = RecoveryMonitor::new(&h.rt);
    let resubmitted = monitor
        .sweep(&[t("T1"), t("T2")], &h.rt.timer(Duration::from_secs(60)))
        .unwrap();
    assert_eq!(resubmitted.len(), 2);
    assert_eq!(h.clock.sleep_count(), 1);
}
