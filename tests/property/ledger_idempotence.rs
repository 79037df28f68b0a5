//! Repeating ledger writes never duplicates rows, stages or marks.

use chrono::{TimeZone, Utc};
use pblsflow::ledger::Ledger;
use pblsflow::types::{RunParams, TargetId};
use proptest::prelude::*;
use tempfile::TempDir;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_replayed_operations_are_no_ops(
        stages in prop::collection::vec(0u32..4, 1..12),
        artifacts in prop::collection::vec(1u32..4, 0..12),
    ) {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.psv")).unwrap();
        let target = TargetId::new("T1").unwrap();
        let params = RunParams::new(4, 7.0, 4).unwrap();
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        ledger.append_first(&target, &params, at).unwrap();
        prop_assert!(!ledger.append_first(&target, &params, at).unwrap());
        for iteration in &stages {
            ledger.record_stage(&target, *iteration, at).unwrap();
        }
        for sequence in &artifacts {
            ledger.mark_acted(&target, &format!("T1_iter0_N4.dag.rescue{sequence:03}")).unwrap();
        }

        let record = ledger.get(&target).unwrap().unwrap();
        let mut distinct_stages = stages.clone();
        distinct_stages.sort_unstable();
        distinct_stages.dedup();
        let mut recorded: Vec<u32> = record.stages.iter().map(|s| s.iteration).collect();
        recorded.sort_unstable();
        prop_assert_eq!(recorded, distinct_stages);

        let mut distinct_artifacts = artifacts.clone();
        distinct_artifacts.sort_unstable();
        distinct_artifacts.dedup();
        prop_assert_eq!(record.acted_artifacts.len(), distinct_artifacts.len());
        prop_assert_eq!(ledger.records().unwrap().len(), 1);
    }
}
