//! CLI commands through the route table, with the recording engine.

use clap::Parser;
use pblsflow::cli::{Cli, RunContext};
use pblsflow::error::OrchestratorError;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run(workspace: &TempDir, args: &[&str]) -> Result<String, OrchestratorError> {
    let ws = workspace.path().to_string_lossy().into_owned();
    let mut argv = vec!["pblsflow", "--workspace", ws.as_str(), "--dry-run"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    let ctx = RunContext::new(cli.workspace.clone(), cli.config.clone(), cli.dry_run)?;
    ctx.execute(&cli.command)
}

/// Run the real binary in `workspace`, isolated from the user's config.
fn run_binary(workspace: &TempDir, args: &[&str]) -> Output {
    let home = workspace.path().join("home");
    std::fs::create_dir_all(&home).unwrap();
    Command::new(env!("CARGO_BIN_EXE_pblsflow"))
        .env("HOME", &home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .arg("--workspace")
        .arg(workspace.path())
        .arg("--dry-run")
        .args(args)
        .output()
        .unwrap()
}

fn fast_config(workspace: &TempDir) {
    std::fs::write(
        workspace.path().join("pblsflow.toml"),
        "[submission]\ninter_submission_delay_secs = 0\n",
    )
    .unwrap();
}

#[test]
fn test_init_writes_config_once() {
    let ws = TempDir::new().unwrap();
    let first = run(&ws, &["init"]).unwrap();
    assert!(first.starts_with("Wrote default configuration"));
    assert!(ws.path().join("pblsflow.toml").is_file());
    assert!(run(&ws, &["init"]).unwrap().contains("already exists"));
}

#[test]
fn test_prepare_rotates_existing_results() {
    let ws = TempDir::new().unwrap();
    let results = ws.path().join("results/T1");
    std::fs::create_dir_all(&results).unwrap();
    std::fs::write(results.join("stale.tar.gz"), b"old").unwrap();

    let out = run(&ws, &["prepare", "T1", "--max-iterations", "2"]).unwrap();
    assert!(out.contains("moved aside 1"));
    assert!(results.is_dir());
    assert_eq!(std::fs::read_dir(&results).unwrap().count(), 0);
    assert!(ws.path().join("logs/T1/iter0").is_dir());
    assert!(ws.path().join("logs/T1/iter1").is_dir());

    let rotated: Vec<String> = std::fs::read_dir(ws.path().join("results"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("T1_"))
        .collect();
    assert_eq!(rotated.len(), 1);
}

#[test]
fn test_submit_then_recover_then_show_ledger() {
    let ws = TempDir::new().unwrap();
    fast_config(&ws);
    let submit = [
        "submit",
        "--target",
        "T1",
        "--total-chunks",
        "4",
        "--snr-threshold",
        "7",
        "--max-iterations",
        "2",
    ];
    assert_eq!(run(&ws, &submit).unwrap(), "Submitted T1 iter0 (N=4)");

    let graphs = ws.path().join("graphs/T1");
    std::fs::write(graphs.join("T1_iter0_N4.dag.rescue001"), b"").unwrap();
    let recovered = run(&ws, &["recover", "--once"]).unwrap();
    assert!(recovered.contains("T1_iter0_N4.dag.rescue001"));
    assert_eq!(
        run(&ws, &["recover", "--once"]).unwrap(),
        "No recovery artifacts to act on."
    );

    let table = run(&ws, &["ledger"]).unwrap();
    assert!(table.contains("T1"));
    let json: serde_json::Value =
        serde_json::from_str(&run(&ws, &["ledger", "--format", "json"]).unwrap()).unwrap();
    assert_eq!(json[0]["resubmissions"].as_array().unwrap().len(), 1);
}

#[test]
fn test_await_chunks_moves_complete_stage() {
    let ws = TempDir::new().unwrap();
    let results = ws.path().join("results/T1");
    std::fs::create_dir_all(&results).unwrap();
    for chunk in 0..2 {
        std::fs::write(results.join(format!("joboutput_T1_{chunk}_2_iter0.tar.gz")), b"x").unwrap();
    }
    let out = run(&ws, &["await-chunks", "--target", "T1", "--total-chunks", "2"]).unwrap();
    assert!(out.starts_with("Moved 2 chunk output(s)"));
    assert!(ws
        .path()
        .join("archive/T1/iter0/joboutput_T1_1_2_iter0.tar.gz")
        .is_file());
}

#[test]
fn test_invalid_config_is_reported() {
    let ws = TempDir::new().unwrap();
    std::fs::write(ws.path().join("pblsflow.toml"), "[pool]\nworkers = 0\n").unwrap();
    let err = run(&ws, &["ledger"]).unwrap_err();
    assert!(matches!(err, OrchestratorError::Config(_)));
}

#[test]
fn test_inconsistent_batch_submits_nothing() {
    let ws = TempDir::new().unwrap();
    fast_config(&ws);
    let batch = ws.path().join("targets.txt");
    std::fs::write(&batch, "T1,4\nT2,4\nT3,8\n").unwrap();
    let batch = batch.to_string_lossy().into_owned();
    let args = [
        "run",
        "--batch",
        batch.as_str(),
        "--snr-threshold",
        "7",
        "--max-iterations",
        "2",
    ];

    let err = run(&ws, &args).unwrap_err();
    assert!(matches!(err, OrchestratorError::InconsistentBatch { line: 3, .. }));
    let ledger: serde_json::Value =
        serde_json::from_str(&run(&ws, &["ledger", "--format", "json"]).unwrap()).unwrap();
    assert!(ledger.as_array().unwrap().is_empty());
    assert!(!ws.path().join("graphs").exists());

    let output = run_binary(&ws, &args);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 3"));
    assert!(!ws.path().join("graphs").exists());
}

#[test]
fn test_missing_or_invalid_parameters_exit_nonzero() {
    let ws = TempDir::new().unwrap();
    fast_config(&ws);
    let cases: [&[&str]; 5] = [
        &["generate", "--target", "T1", "--total-chunks", "4", "--max-iterations", "2"],
        &["generate", "--target", "T1", "--total-chunks", "abc", "--snr-threshold", "7", "--max-iterations", "2"],
        &["submit", "--target", "T1", "--snr-threshold", "7", "--max-iterations", "2"],
        &["submit", "--target", "T1", "--total-chunks", "0", "--snr-threshold", "7", "--max-iterations", "2"],
        &["submit", "--target", "T1", "--total-chunks", "4", "--snr-threshold", "7", "--max-iterations", "0"],
    ];
    for args in cases {
        let output = run_binary(&ws, args);
        assert!(
            !output.status.success(),
            "{args:?} should fail: stdout={:?}",
            String::from_utf8_lossy(&output.stdout)
        );
    }
    assert!(!ws.path().join("graphs").exists());

    let ok = run_binary(
        &ws,
        &["generate", "--target", "T1", "--total-chunks", "4", "--snr-threshold", "7", "--max-iterations", "2", "--fingerprint"],
    );
    assert!(ok.status.success(), "{:?}", String::from_utf8_lossy(&ok.stderr));
}

