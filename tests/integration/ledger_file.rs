//! Ledger persistence on disk.

use super::test_utils::{params, t};
use chrono::{TimeZone, Utc};
use pblsflow::error::LedgerError;
use pblsflow::ledger::Ledger;
use tempfile::TempDir;

#[test]
fn test_rows_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.psv");
    let at = Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap();
    {
        let ledger = Ledger::open(&path).unwrap();
        assert!(ledger.append_first(&t("T1"), &params(8, 3), at).unwrap());
        ledger.record_stage(&t("T1"), 0, at).unwrap();
        ledger.append_resubmission(&t("T1"), at).unwrap();
        ledger.mark_acted(&t("T1"), "T1_iter0_N8.dag.rescue001").unwrap();
    }

    let ledger = Ledger::open(&path).unwrap();
    let record = ledger.get(&t("T1")).unwrap().unwrap();
    assert_eq!(record.params.total_chunks, 8);
    assert_eq!(record.first_submission, at);
    assert_eq!(record.resubmissions, vec![at]);
    assert!(record.stage_submitted(0));
    assert!(!record.stage_submitted(1));
    assert!(record.has_acted_on("T1_iter0_N8.dag.rescue001"));
}

#[test]
fn test_first_submission_is_recorded_once() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open(dir.path().join("ledger.psv")).unwrap();
    let first = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
    assert!(ledger.append_first(&t("T1"), &params(4, 2), first).unwrap());
    assert!(!ledger.append_first(&t("T1"), &params(4, 2), later).unwrap());

    let records = ledger.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].first_submission, first);
}

#[test]
fn test_resubmission_needs_first_submission() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open(dir.path().join("ledger.psv")).unwrap();
    let err = ledger.append_resubmission(&t("T9"), Utc::now()).unwrap_err();
    assert!(matches!(err, LedgerError::NotSubmitted(_)));
}

#[test]
fn test_foreign_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.psv");
    std::fs::write(&path, "target,chunks\nT1,4\n").unwrap();
    assert!(matches!(
        Ledger::open(&path),
        Err(LedgerError::SchemaMismatch { .. })
    ));
}
