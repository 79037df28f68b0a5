//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::artifact::StageId;
use crate::batch::Batch;
use crate::clock::SystemClock;
use crate::completion::CompletionDetector;
use crate::config::{ConfigLoader, EngineKind, PblsflowConfig};
use crate::driver::SubmissionDriver;
use crate::engine::{CommandEngine, ExecutionEngine, RecordingEngine};
use crate::error::OrchestratorError;
use crate::fanin::FanInAggregator;
use crate::graph::{self, TaskGraph};
use crate::ledger::Ledger;
use crate::pool::{RunRequest, WorkerPool};
use crate::recovery::RecoveryMonitor;
use crate::runtime::Runtime;
use crate::store::FsArtifactStore;
use crate::target::{draw_injection, InjectionRanges};
use crate::types::{RunParams, TargetId};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cli::parse::{Commands, RunArgs, StageArgs};
use crate::cli::presentation::{
    format_fan_in_outcome, format_ledger_json, format_ledger_text, format_monitor_report,
    format_recovery, format_run_reports, format_submit_outcome,
};

/// Runtime context for CLI execution: workspace, loaded config, engine choice.
/// Built from workspace path and optional config path using ConfigLoader only.
pub struct RunContext {
    workspace_root: PathBuf,
    config: PblsflowConfig,
    dry_run: bool,
}

impl RunContext {
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        dry_run: bool,
    ) -> Result<Self, OrchestratorError> {
        let workspace_root = dunce::canonicalize(&workspace_root).unwrap_or(workspace_root);
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        let dry_run = dry_run || config.engine.kind == EngineKind::DryRun;
        Ok(Self {
            workspace_root,
            config,
            dry_run,
        })
    }

    pub fn config(&self) -> &PblsflowConfig {
        &self.config
    }

    /// Wire up the filesystem store, the ledger, the engine and the system clock.
    pub fn runtime(&self) -> Result<Runtime, OrchestratorError> {
        let engine: Arc<dyn ExecutionEngine> = if self.dry_run {
            info!("Dry run: engine calls are recorded, not executed");
            Arc::new(RecordingEngine::new())
        } else {
            Arc::new(CommandEngine::new(self.config.engine.commands()))
        };
        let ledger_path = self.config.paths.ledger(&self.workspace_root);
        Ok(Runtime {
            store: Arc::new(FsArtifactStore::new()),
            ledger: Arc::new(Ledger::open(ledger_path)?),
            engine,
            clock: Arc::new(SystemClock),
            layout: self.config.paths.layout(&self.workspace_root),
            settings: self.config.settings(),
        })
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, OrchestratorError> {
        match command {
            Commands::Init => self.handle_init(),
            Commands::Generate {
                run,
                stage,
                fingerprint,
            } => self.handle_generate(run, *stage, *fingerprint),
            Commands::Joblist {
                target,
                total_chunks,
                iteration,
            } => {
                ChunkTotal(*total_chunks).check()?;
                Ok(graph::joblist(&target.parse()?, *total_chunks, *iteration)
                    .trim_end()
                    .to_string())
            }
            Commands::Inject { base, count, seed } => self.handle_inject(base, *count, *seed),
            Commands::Prepare {
                targets,
                max_iterations,
            } => self.handle_prepare(targets, *max_iterations),
            Commands::Submit { run, iteration } => self.handle_submit(run, *iteration),
            Commands::Run {
                batch,
                target,
                total_chunks,
                snr_threshold,
                max_iterations,
                workers,
            } => {
                let batch = match (batch, target) {
                    (Some(path), _) => Batch::read(path)?,
                    (None, Some(target)) => Batch::parse(target)?,
                    (None, None) => {
                        return Err(OrchestratorError::InvalidParameters(
                            "either --batch or --target is required".to_string(),
                        ))
                    }
                };
                let requests = batch.requests(*total_chunks, *snr_threshold, *max_iterations)?;
                self.handle_run(requests, *workers)
            }
            Commands::Recover { targets, once } => self.handle_recover(targets, *once),
            Commands::AwaitChunks { stage } => self.handle_await_chunks(stage),
            Commands::Monitor {
                targets,
                total_chunks,
                iteration,
            } => self.handle_monitor(targets, *total_chunks, *iteration),
            Commands::Ledger { format } => self.handle_ledger(format),
        }
    }

    fn handle_init(&self) -> Result<String, OrchestratorError> {
        let path = crate::config::workspace_config_path(&self.workspace_root);
        if ConfigLoader::write_default(&self.workspace_root)? {
            Ok(format!("Wrote default configuration to {}", path.display()))
        } else {
            Ok(format!("{} already exists; left unchanged", path.display()))
        }
    }

    fn handle_generate(
        &self,
        run: &RunArgs,
        stage: Option<u32>,
        fingerprint: bool,
    ) -> Result<String, OrchestratorError> {
        let target: TargetId = run.target.parse()?;
        let full = graph::generate(
            &target,
            run.total_chunks,
            run.snr_threshold,
            run.max_iterations,
        )?;
        let graph: TaskGraph = match stage {
            Some(iteration) => full.stage(iteration)?,
            None => full,
        };
        if fingerprint {
            return Ok(graph.fingerprint());
        }
        Ok(graph.render(&self.config.graph).trim_end().to_string())
    }

    fn handle_inject(
        &self,
        base: &str,
        count: u32,
        seed: Option<u64>,
    ) -> Result<String, OrchestratorError> {
        let base: TargetId = base.parse()?;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let ranges = InjectionRanges::default();
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            ids.push(draw_injection(&base, &ranges, &mut rng)?.id.to_string());
        }
        Ok(ids.join("\n"))
    }

    fn handle_prepare(
        &self,
        targets: &[String],
        max_iterations: u32,
    ) -> Result<String, OrchestratorError> {
        if max_iterations < 1 {
            return Err(OrchestratorError::InvalidParameters(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        let store = FsArtifactStore::new();
        let layout = self.config.paths.layout(&self.workspace_root);
        let mut rng = StdRng::from_entropy();
        let mut lines = Vec::new();
        for raw in targets {
            let target: TargetId = raw.parse()?;
            let rotated =
                layout.prepare_target(&store, &target, max_iterations, Utc::now(), &mut rng)?;
            lines.push(format!(
                "{}: prepared {} iteration log dir(s), moved aside {}",
                target,
                max_iterations,
                rotated.len()
            ));
        }
        Ok(lines.join("\n"))
    }

    fn handle_submit(&self, run: &RunArgs, iteration: u32) -> Result<String, OrchestratorError> {
        let target: TargetId = run.target.parse()?;
        let params = RunParams::new(run.total_chunks, run.snr_threshold, run.max_iterations)?;
        if iteration >= params.max_iterations {
            return Err(OrchestratorError::InvalidParameters(format!(
                "iteration {} is outside 0..{}",
                iteration, params.max_iterations
            )));
        }
        let rt = self.runtime()?;
        let outcome = SubmissionDriver::new(&rt).submit_iteration(&target, &params, iteration)?;
        Ok(format_submit_outcome(&outcome))
    }

    fn handle_run(
        &self,
        requests: Vec<RunRequest>,
        workers: Option<usize>,
    ) -> Result<String, OrchestratorError> {
        let rt = self.runtime()?;
        let policy = self.config.policy.kind.build();
        let workers = workers.unwrap_or(self.config.pool.workers);
        let total = requests.len();
        let reports = WorkerPool::new(&rt, policy.as_ref(), workers).run_all(requests);
        let (summary, failed) = format_run_reports(&reports, self.config.logging.color);
        if failed > 0 {
            return Err(OrchestratorError::RunsFailed {
                summary,
                failed,
                total,
            });
        }
        Ok(summary)
    }

    fn handle_recover(&self, targets: &[String], once: bool) -> Result<String, OrchestratorError> {
        let rt = self.runtime()?;
        let tracked: Vec<TargetId> = if targets.is_empty() {
            rt.ledger.records()?.into_iter().map(|r| r.target).collect()
        } else {
            targets
                .iter()
                .map(|t| t.parse::<TargetId>())
                .collect::<Result<Vec<_>, _>>()?
        };
        let mut monitor = RecoveryMonitor::new(&rt);
        let resubmitted = if once {
            monitor.scan(&tracked)?.resubmitted
        } else {
            monitor.sweep(&tracked, &rt.timer(rt.settings.sweep_interval))?
        };
        Ok(format_recovery(&resubmitted))
    }

    fn handle_await_chunks(&self, args: &StageArgs) -> Result<String, OrchestratorError> {
        ChunkTotal(args.total_chunks).check()?;
        let rt = self.runtime()?;
        let stage = StageId::new(args.target.parse()?, args.iteration, args.total_chunks);
        let outcome = FanInAggregator::new(&rt)
            .await_chunks(&stage, &rt.timer(rt.settings.fan_in_poll))?;
        Ok(format_fan_in_outcome(&stage, &outcome))
    }

    fn handle_monitor(
        &self,
        targets: &[String],
        total_chunks: u32,
        iteration: u32,
    ) -> Result<String, OrchestratorError> {
        ChunkTotal(total_chunks).check()?;
        let rt = self.runtime()?;
        let stages = targets
            .iter()
            .map(|t| Ok(StageId::new(t.parse()?, iteration, total_chunks)))
            .collect::<Result<Vec<_>, OrchestratorError>>()?;
        let report = CompletionDetector::new(rt.store.as_ref(), &rt.layout)
            .monitor(stages, &rt.timer(rt.settings.completion_poll))?;
        Ok(format_monitor_report(&report))
    }

    fn handle_ledger(&self, format: &str) -> Result<String, OrchestratorError> {
        let ledger = Ledger::open(self.config.paths.ledger(&self.workspace_root))?;
        let records = ledger.records()?;
        match format {
            "json" => format_ledger_json(&records),
            "text" => Ok(format_ledger_text(&records)),
            other => Err(OrchestratorError::InvalidParameters(format!(
                "unknown format {:?} (expected text or json)",
                other
            ))),
        }
    }
}

struct ChunkTotal(u32);

impl ChunkTotal {
    fn check(&self) -> Result<(), OrchestratorError> {
        if self.0 < 1 {
            return Err(OrchestratorError::InvalidParameters(
                "total_chunks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
