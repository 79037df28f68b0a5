//! Whole target runs: submit, wait, transfer, decide, repeat.

use super::test_utils::{names_in, params, put_output_at, put_verdict_at, t, Harness};
use pblsflow::pipeline::{RunOutcome, TargetRun};
use pblsflow::policy::{MaxIterations, SnrVerdict};
use pblsflow::pool::{RunRequest, WorkerPool};
use std::collections::BTreeMap;
use std::time::Duration;

/// Each sleep lands one more chunk output for the most recently submitted
/// iteration, the way grid jobs trickle in. Once the iteration is archived,
/// the next sleep finishes its mask step.
fn trickle_outputs(h: &Harness, target: &'static str, total: u32) {
    let engine = h.engine.clone();
    let layout = h.rt.layout.clone();
    let mut landed: BTreeMap<u32, u32> = BTreeMap::new();
    h.clock.set_hook(move |_| {
        let Some(latest) = engine.submissions().last().cloned() else {
            return;
        };
        let iteration: u32 = latest
            .name
            .rsplit("_iter")
            .next()
            .and_then(|i| i.parse().ok())
            .unwrap();
        if iteration > 0 {
            // The previous stage must be archived and masked before this one went out.
            let previous = layout.archive(&t(target), iteration - 1);
            assert_eq!(names_in(&previous).len(), total as usize);
            assert!(layout.mask_verdict(&t(target), iteration - 1).is_file());
        }
        let count = landed.entry(iteration).or_insert(0);
        if *count < total {
            put_output_at(&layout, target, *count, total, iteration);
            *count += 1;
        } else if !layout.mask_verdict(&t(target), iteration).is_file() {
            assert_eq!(
                names_in(&layout.archive(&t(target), iteration)).len(),
                total as usize
            );
            put_verdict_at(&layout, target, iteration, "9.0");
        }
    });
}

#[test]
fn test_two_iterations_run_in_order() {
    let h = Harness::new();
    trickle_outputs(&h, "T1", 4);

    let outcome = TargetRun::new(&h.rt, &MaxIterations, t("T1"), params(4, 2))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(outcome, RunOutcome::Completed { iterations: 2 });
    let names: Vec<String> = h.engine.submissions().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["T1_iter0".to_string(), "T1_iter1".to_string()]);
    for iteration in 0..2 {
        assert_eq!(names_in(&h.rt.layout.archive(&t("T1"), iteration)).len(), 4);
    }
    assert!(names_in(&h.rt.layout.receiving(&t("T1"))).is_empty());

    let record = h.rt.ledger.get(&t("T1")).unwrap().unwrap();
    assert!(record.stage_submitted(0) && record.stage_submitted(1));

    let graphs = names_in(&h.rt.layout.graphs(&t("T1")));
    assert_eq!(graphs, vec!["T1_iter0_N4.dag", "T1_iter1_N4.dag"]);
}

#[test]
fn test_rerun_after_completion_submits_nothing() {
    let h = Harness::new();
    trickle_outputs(&h, "T1", 2);
    TargetRun::new(&h.rt, &MaxIterations, t("T1"), params(2, 2))
        .unwrap()
        .run()
        .unwrap();

    let again = TargetRun::new(&h.rt, &MaxIterations, t("T1"), params(2, 2))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(again, RunOutcome::Completed { iterations: 2 });
    assert_eq!(h.engine.submissions().len(), 2);
}

#[test]
fn test_low_snr_verdict_stops_early() {
    let h = Harness::new();
    trickle_outputs(&h, "T1", 2);
    h.put_verdict("T1", 0, "6.5\n");

    let outcome = TargetRun::new(&h.rt, &SnrVerdict, t("T1"), params(2, 3))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(outcome, RunOutcome::Stopped { iteration: 0 });
    assert_eq!(h.engine.submissions().len(), 1);
}

#[test]
fn test_pool_runs_every_target() {
    let mut h = Harness::new();
    h.rt.settings.inter_submission_delay = Duration::ZERO;
    for target in ["T1", "T2", "T3"] {
        for chunk in 0..3 {
            h.put_output(target, chunk, 3, 0);
        }
        h.put_verdict(target, 0, "9.0");
    }
    let requests = ["T1", "T2", "T3"]
        .into_iter()
        .map(|id| RunRequest {
            target: t(id),
            params: params(3, 1),
        })
        .collect();

    let reports = WorkerPool::new(&h.rt, &MaxIterations, 2).run_all(requests);
    let targets: Vec<String> = reports.iter().map(|r| r.target.to_string()).collect();
    assert_eq!(targets, vec!["T1", "T2", "T3"]);
    for report in &reports {
        assert_eq!(
            report.result.as_ref().unwrap(),
            &RunOutcome::Completed { iterations: 1 }
        );
    }
    assert_eq!(h.engine.submissions().len(), 3);
    assert_eq!(h.rt.ledger.records().unwrap().len(), 3);
}
