use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::judge::Judgment;
use crate::outcome::Outcome;
use crate::results::EvalMeta;

#[derive(Debug, Default)]
pub struct ReportSummary {
    pub runs: usize,
    pub success: usize,
    pub fail: usize,
    pub exhausted: usize,
    pub error: usize,
    pub avg_duration_secs: Option<f64>,
    /// Averaged over runs that produced a report.
    pub avg_attempts: Option<f64>,
    pub check_pass_rates: BTreeMap<String, (usize, usize)>,
}

pub fn load_run_dirs(case_results_dir: &Path) -> Result<Vec<PathBuf>> {
    if !case_results_dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(case_results_dir)
        .with_context(|| format!("read {}", case_results_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn aggregate(case_results_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let mut summary = ReportSummary::default();
    let mut warnings = Vec::new();
    let mut total_duration = 0.0;
    let mut total_attempts = 0u64;
    let mut attempt_runs = 0usize;

    for run_dir in load_run_dirs(case_results_dir)? {
        let meta_path = run_dir.join("meta.json");
        let checks_path = run_dir.join("checks.json");

        let meta: EvalMeta = match fs::read_to_string(&meta_path)
            .with_context(|| format!("read {}", meta_path.display()))
            .and_then(|contents| serde_json::from_str(&contents).context("parse meta"))
        {
            Ok(meta) => meta,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: meta.json invalid ({err})",
                    run_dir.display()
                ));
                continue;
            }
        };

        // Errored runs have no checks.json.
        if checks_path.exists() {
            match fs::read_to_string(&checks_path)
                .with_context(|| format!("read {}", checks_path.display()))
                .and_then(|contents| {
                    serde_json::from_str::<Judgment>(&contents).context("parse checks")
                }) {
                Ok(judgment) => update_check_pass_rates(&mut summary.check_pass_rates, &judgment),
                Err(err) => warnings.push(format!(
                    "{}: checks.json invalid ({err})",
                    run_dir.display()
                )),
            }
        }

        summary.runs += 1;
        match meta.outcome {
            Outcome::Success => summary.success += 1,
            Outcome::Fail => summary.fail += 1,
            Outcome::Exhausted => summary.exhausted += 1,
            Outcome::Error => summary.error += 1,
        }
        total_duration += meta.duration_secs;
        if let Some(attempts) = meta.attempts {
            total_attempts += u64::from(attempts);
            attempt_runs += 1;
        }
    }

    if summary.runs > 0 {
        summary.avg_duration_secs = Some(total_duration / summary.runs as f64);
    }
    if attempt_runs > 0 {
        summary.avg_attempts = Some(total_attempts as f64 / attempt_runs as f64);
    }
    Ok((summary, warnings))
}

fn update_check_pass_rates(stats: &mut BTreeMap<String, (usize, usize)>, judgment: &Judgment) {
    for check in &judgment.checks {
        let entry = stats.entry(check.label()).or_insert((0, 0));
        if check.passed() {
            entry.0 += 1;
        }
        entry.1 += 1;
    }
}
