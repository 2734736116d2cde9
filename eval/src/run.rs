//! Case execution orchestration.
//!
//! Coordinates the driver run, check judgment, and result capture.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use healer::driver::{DriverConfig, RunEvent, run_task};
use healer::io::config::HealerConfig;
use healer::io::executor::Executor;
use healer::io::generator::Generator;
use tracing::{debug, info, instrument};

use crate::case::CaseFile;
use crate::config::apply_case_config;
use crate::judge::run_checks;
use crate::outcome::{Outcome, classify_outcome};
use crate::results::{CaptureInput, capture_results};

/// Result of running a single case.
#[derive(Debug)]
pub struct RunOutcome {
    /// Unique identifier for this eval run.
    pub eval_run_id: String,
    /// Path to the results directory.
    pub results_dir: PathBuf,
    /// Classified outcome.
    pub outcome: Outcome,
    pub attempts: Option<u32>,
}

/// Shared collaborators for every run of an eval invocation.
pub struct RunContext<'a, G: ?Sized, E: ?Sized> {
    pub repo_root: &'a Path,
    pub base_config: &'a HealerConfig,
    pub generator: &'a G,
    pub executor: &'a E,
}

/// Run a case end-to-end: driver loop, checks, result capture.
///
/// A driver error is recorded as an `error` outcome, not returned.
#[instrument(skip_all, fields(case_id = %case.case.id))]
pub fn run_case<G, E>(
    ctx: &RunContext<'_, G, E>,
    case_path: &Path,
    case: &CaseFile,
) -> Result<RunOutcome>
where
    G: Generator + ?Sized,
    E: Executor + ?Sized,
{
    info!("case run started");
    let cfg =
        apply_case_config(ctx.base_config.clone(), &case.config).context("apply case config")?;
    let driver_config = DriverConfig::from(&cfg);

    let started_at = Utc::now();
    let eval_run_id = format!(
        "eval-{}-{:04x}",
        started_at.format("%Y%m%d_%H%M%S"),
        rand::random::<u16>()
    );

    let result = run_task(&case.case.task, ctx.generator, ctx.executor, &driver_config, |event| {
        if let RunEvent::Executed { attempt, result } = event {
            debug!(attempt, exit_reason = result.exit_reason.as_str(), "attempt finished");
        }
    });
    let finished_at = Utc::now();

    let (report, error) = match result {
        Ok(state) => (Some(state.report()), None),
        Err(err) => (None, Some(format!("{:#}", anyhow::Error::new(err)))),
    };
    let judgment = report.as_ref().map(|report| run_checks(&case.checks, report));
    let outcome = classify_outcome(report.as_ref(), judgment.as_ref());
    let duration = finished_at - started_at;
    info!(
        outcome = ?outcome,
        duration_secs = duration.num_milliseconds() as f64 / 1000.0,
        "driver run finished"
    );

    let capture_input = CaptureInput {
        case_id: &case.case.id,
        case_path,
        eval_run_id: &eval_run_id,
        started_at,
        finished_at,
        repo_root: ctx.repo_root,
        outcome,
        report: report.as_ref(),
        judgment: judgment.as_ref(),
        error,
    };
    let results_dir = capture_results(&ctx.repo_root.join("eval").join("results"), &capture_input)
        .context("capture results")?;

    info!(outcome = ?outcome, results_dir = %results_dir.display(), "case run complete");
    Ok(RunOutcome {
        eval_run_id,
        results_dir,
        outcome,
        attempts: report.map(|report| report.attempts),
    })
}
