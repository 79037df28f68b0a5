//! Batch files feeding the worker pool.

use pblsflow::batch::Batch;
use pblsflow::error::OrchestratorError;
use tempfile::TempDir;

#[test]
fn test_batch_file_with_shared_total() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("targets.txt");
    std::fs::write(
        &path,
        "# quarter 9 targets\nkplr006184894,16\n\nkplr010666592,16\n",
    )
    .unwrap();

    let batch = Batch::read(&path).unwrap();
    assert_eq!(batch.total_chunks, Some(16));
    let requests = batch.requests(None, 7.0, 3).unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].target.as_str(), "kplr010666592");
    assert_eq!(requests[1].params.total_chunks, 16);
    assert_eq!(requests[1].params.max_iterations, 3);
}

#[test]
fn test_mixed_totals_are_rejected_with_line() {
    let err = Batch::parse("T1,16\nT2,32\n").unwrap_err();
    match err {
        OrchestratorError::InconsistentBatch { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {other}"),
    }
    assert!(Batch::parse("T1,16\nT2\n").is_err());
}

#[test]
fn test_cli_total_must_agree_with_batch() {
    let batch = Batch::parse("T1,16\n").unwrap();
    assert!(batch.requests(Some(16), 7.0, 2).is_ok());
    assert!(matches!(
        batch.requests(Some(8), 7.0, 2),
        Err(OrchestratorError::InconsistentBatch { .. })
    ));

    let bare = Batch::parse("T1\nT2\n").unwrap();
    assert!(bare.requests(None, 7.0, 2).is_err());
    assert_eq!(bare.requests(Some(4), 7.0, 2).unwrap().len(), 2);
}

#[test]
fn test_missing_batch_file() {
    let dir = TempDir::new().unwrap();
    assert!(Batch::read(&dir.path().join("absent.txt")).is_err());
}
