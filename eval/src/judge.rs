//! Check evaluation and outcome recording.
//!
//! Checks are judged against the final run report, so they need no access
//! to the interpreter or the model.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use healer::core::types::{Outcome as RunOutcome, RunReport};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::case::Check;

/// Collected check outcomes for a run.
#[derive(Debug, Serialize, Deserialize)]
pub struct Judgment {
    pub checks: Vec<CheckOutcome>,
}

impl Judgment {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(CheckOutcome::passed)
    }
}

/// Result of judging a single check.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckOutcome {
    OutcomeIs {
        expected: RunOutcome,
        actual: Option<RunOutcome>,
        passed: bool,
    },
    StdoutContains {
        text: String,
        passed: bool,
    },
    AttemptsAtMost {
        max: u32,
        attempts: u32,
        passed: bool,
    },
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        match self {
            CheckOutcome::OutcomeIs { passed, .. }
            | CheckOutcome::StdoutContains { passed, .. }
            | CheckOutcome::AttemptsAtMost { passed, .. } => *passed,
        }
    }

    pub fn label(&self) -> String {
        match self {
            CheckOutcome::OutcomeIs { expected, .. } => format!("outcome_is({expected:?})"),
            CheckOutcome::StdoutContains { text, .. } => format!("stdout_contains({text})"),
            CheckOutcome::AttemptsAtMost { max, .. } => format!("attempts_at_most({max})"),
        }
    }
}

/// Judge all checks against a finished run.
#[instrument(skip_all, fields(check_count = checks.len()))]
pub fn run_checks(checks: &[Check], report: &RunReport) -> Judgment {
    let outcomes = checks
        .iter()
        .map(|check| {
            let outcome = match check {
                Check::OutcomeIs { outcome } => CheckOutcome::OutcomeIs {
                    expected: *outcome,
                    actual: report.outcome,
                    passed: report.outcome == Some(*outcome),
                },
                Check::StdoutContains { text } => CheckOutcome::StdoutContains {
                    text: text.clone(),
                    passed: report.stdout.contains(text.as_str()),
                },
                Check::AttemptsAtMost { max } => CheckOutcome::AttemptsAtMost {
                    max: *max,
                    attempts: report.attempts,
                    passed: report.attempts <= *max,
                },
            };
            debug!(check = %outcome.label(), passed = outcome.passed(), "check result");
            outcome
        })
        .collect();
    Judgment { checks: outcomes }
}

pub fn write_judgment(path: &Path, judgment: &Judgment) -> Result<()> {
    let contents = serde_json::to_string_pretty(judgment).context("serialize checks")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: RunOutcome, attempts: u32, stdout: &str) -> RunReport {
        RunReport {
            task: "compute 6 factorial".to_string(),
            program: Some("print(720)".to_string()),
            attempts,
            outcome: Some(outcome),
            exit_reason: None,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn checks() -> Vec<Check> {
        vec![
            Check::OutcomeIs {
                outcome: RunOutcome::Success,
            },
            Check::StdoutContains {
                text: "720".to_string(),
            },
            Check::AttemptsAtMost { max: 2 },
        ]
    }

    #[test]
    fn all_checks_pass() {
        let judgment = run_checks(&checks(), &report(RunOutcome::Success, 2, "720\n"));
        assert!(judgment.all_passed());
    }

    #[test]
    fn each_check_can_fail() {
        let judgment = run_checks(&checks(), &report(RunOutcome::Exhausted, 3, "719\n"));
        let passed: Vec<bool> = judgment.checks.iter().map(CheckOutcome::passed).collect();
        assert_eq!(passed, vec![false, false, false]);
        assert_eq!(judgment.checks[2].label(), "attempts_at_most(2)");
    }

    #[test]
    fn judgment_serializes_with_type_tags() {
        let judgment = run_checks(&checks(), &report(RunOutcome::Success, 1, "720\n"));
        let value = serde_json::to_value(&judgment).expect("json");
        assert_eq!(value["checks"][0]["type"], "outcome_is");
        assert_eq!(value["checks"][0]["expected"], "success");
        assert_eq!(value["checks"][2]["attempts"], 1);
    }
}
