//! CLI command implementations.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread;

use anyhow::{Context, Result, bail};
use healer::io::config::load_config;
use tracing::{debug, info, warn};

use crate::case::{CaseFile, discover_cases};
use crate::report::aggregate;
use crate::run::{RunContext, run_case};

fn cases_dir(repo_root: &Path) -> PathBuf {
    repo_root.join("eval").join("cases")
}

/// List all available cases.
pub fn list_cases(repo_root: &Path) -> Result<()> {
    let cases = discover_cases(&cases_dir(repo_root))?;
    for case in cases {
        println!("{}", case.case.id);
    }
    Ok(())
}

/// Options for `eval run`.
#[derive(Debug)]
pub struct RunOptions<'a> {
    pub case_ids: &'a [String],
    pub runs: u32,
    pub jobs: usize,
    pub config_path: &'a Path,
}

/// Run cases by id, `runs` times each, on up to `jobs` threads.
///
/// Every run has its own driver state and executor scratch directories; the
/// generator and executor are shared.
pub fn run_cases(repo_root: &Path, opts: &RunOptions<'_>) -> Result<()> {
    if opts.case_ids.is_empty() {
        bail!("no case ids given");
    }
    let mut cases = Vec::with_capacity(opts.case_ids.len());
    for case_id in opts.case_ids {
        let case_path = cases_dir(repo_root).join(format!("{case_id}.toml"));
        if !case_path.exists() {
            bail!("case {} not found at {}", case_id, case_path.display());
        }
        let case = CaseFile::load(&case_path).context("load case")?;
        debug!(case_id, "case loaded");
        cases.push((case_path, case));
    }

    let base_config = load_config(opts.config_path)
        .with_context(|| format!("load {}", opts.config_path.display()))?;
    let generator = base_config.build_generator();
    let executor = base_config.build_executor()?;
    let ctx = RunContext {
        repo_root,
        base_config: &base_config,
        generator: &generator,
        executor: &executor,
    };

    let queue: VecDeque<(&PathBuf, &CaseFile, u32)> = cases
        .iter()
        .flat_map(|(path, case)| (1..=opts.runs).map(move |run_num| (path, case, run_num)))
        .collect();
    let total = queue.len();
    let jobs = opts.jobs.clamp(1, total.max(1));
    info!(total, jobs, "starting runs");

    let queue = Mutex::new(queue);
    let failures = Mutex::new(0usize);
    thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| {
                loop {
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                    let Some((case_path, case, run_num)) = next else {
                        break;
                    };
                    debug!(case_id = %case.case.id, run_num, "starting run");
                    match run_case(&ctx, case_path, case) {
                        Ok(outcome) => println!(
                            "run: case={} eval_run_id={} outcome={:?} attempts={} results={}",
                            case.case.id,
                            outcome.eval_run_id,
                            outcome.outcome,
                            outcome
                                .attempts
                                .map_or_else(|| "-".to_string(), |n| n.to_string()),
                            outcome.results_dir.display()
                        ),
                        Err(err) => {
                            warn!(case_id = %case.case.id, run_num, "run failed");
                            eprintln!("run: case={} failed: {:#}", case.case.id, err);
                            *failures.lock().unwrap_or_else(PoisonError::into_inner) += 1;
                        }
                    }
                }
            });
        }
    });

    let failures = failures.into_inner().unwrap_or_else(PoisonError::into_inner);
    if failures > 0 {
        bail!("{failures} of {total} runs could not be recorded");
    }
    Ok(())
}

/// Show aggregated results for a case.
pub fn report_case(repo_root: &Path, case_id: &str) -> Result<()> {
    let results_dir = repo_root.join("eval").join("results").join(case_id);
    let (summary, warnings) = aggregate(&results_dir)?;
    println!("report: case={} runs={}", case_id, summary.runs);
    println!(
        "report: success={} fail={} exhausted={} error={}",
        summary.success, summary.fail, summary.exhausted, summary.error
    );
    if let Some(avg) = summary.avg_attempts {
        println!("report: avg_attempts={:.2}", avg);
    }
    if let Some(avg) = summary.avg_duration_secs {
        println!("report: avg_duration_secs={:.2}", avg);
    }
    for (label, (passed, total)) in summary.check_pass_rates {
        println!("report: check {} {}/{}", label, passed, total);
    }
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// Remove recorded results for a case.
pub fn clean_case(repo_root: &Path, case_id: &str) -> Result<()> {
    let case_results = repo_root.join("eval").join("results").join(case_id);
    if case_results.exists() {
        std::fs::remove_dir_all(&case_results)
            .with_context(|| format!("remove {}", case_results.display()))?;
    }
    println!("clean: case={} results={}", case_id, case_results.display());
    Ok(())
}
