use healer::core::types::{Outcome as RunOutcome, RunReport};
use serde::{Deserialize, Serialize};

use crate::judge::Judgment;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Fail,
    Exhausted,
    Error,
}

/// Classify one eval run. `None` means the driver returned an error.
///
/// Only a run the driver finished successfully can count as a success; an
/// exhausted budget stays `Exhausted` whatever its checks say.
pub fn classify_outcome(report: Option<&RunReport>, judgment: Option<&Judgment>) -> Outcome {
    let (Some(report), Some(judgment)) = (report, judgment) else {
        return Outcome::Error;
    };
    match report.outcome {
        Some(RunOutcome::Success) if judgment.all_passed() => Outcome::Success,
        Some(RunOutcome::Success) => Outcome::Fail,
        Some(RunOutcome::Exhausted) => Outcome::Exhausted,
        None => Outcome::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::CheckOutcome;

    fn report(outcome: RunOutcome) -> RunReport {
        RunReport {
            task: "task".to_string(),
            program: None,
            attempts: 1,
            outcome: Some(outcome),
            exit_reason: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn judgment(pass: bool) -> Judgment {
        Judgment {
            checks: vec![CheckOutcome::StdoutContains {
                text: "720".to_string(),
                passed: pass,
            }],
        }
    }

    #[test]
    fn success_when_checks_pass() {
        let outcome = classify_outcome(Some(&report(RunOutcome::Success)), Some(&judgment(true)));
        assert_eq!(outcome, Outcome::Success);
    }

    #[test]
    fn fail_when_run_succeeds_but_checks_fail() {
        let outcome = classify_outcome(Some(&report(RunOutcome::Success)), Some(&judgment(false)));
        assert_eq!(outcome, Outcome::Fail);
    }

    #[test]
    fn exhausted_when_budget_spent_and_checks_fail() {
        let outcome =
            classify_outcome(Some(&report(RunOutcome::Exhausted)), Some(&judgment(false)));
        assert_eq!(outcome, Outcome::Exhausted);
    }

    #[test]
    fn exhausted_even_when_checks_pass() {
        let judgment = Judgment {
            checks: vec![CheckOutcome::AttemptsAtMost {
                max: 3,
                attempts: 3,
                passed: true,
            }],
        };
        let outcome = classify_outcome(Some(&report(RunOutcome::Exhausted)), Some(&judgment));
        assert_eq!(outcome, Outcome::Exhausted);
    }

    #[test]
    fn error_when_run_errored() {
        assert_eq!(classify_outcome(None, None), Outcome::Error);
    }
}
