//! End-to-end runs of the driver with a scripted generator and a real
//! subprocess executor.

use std::time::Duration;

use healer::core::blocklist::{Blocklist, default_rules};
use healer::core::types::{ExitReason, Outcome};
use healer::driver::{DriverConfig, run_task};
use healer::io::executor::{ExecutorSettings, SubprocessExecutor};
use healer::test_support::{ScriptedGenerator, fenced, python3_available};

const FACTORIAL: &str = "result = 1\nfor i in range(1, 7):\n    result *= i\nprint(result)";
const FACTORIAL_TYPO: &str = "result = 1\nfor i in range(1, 7):\n    result *= i\nprnt(result)";

fn executor() -> SubprocessExecutor {
    SubprocessExecutor::new(
        ExecutorSettings::default(),
        Blocklist::new(&default_rules()).expect("blocklist"),
    )
}

fn config(retry_budget: u32) -> DriverConfig {
    DriverConfig {
        retry_budget,
        attempt_timeout: Duration::from_secs(10),
    }
}

macro_rules! require_python {
    () => {
        if !python3_available() {
            eprintln!("skipping: python3 not available");
            return;
        }
    };
}

#[test]
fn factorial_succeeds_first_try() {
    require_python!();
    let generator = ScriptedGenerator::texts([fenced(FACTORIAL)]);

    let state = run_task("compute 6 factorial", &generator, &executor(), &config(3), |_| {})
        .expect("run");
    let report = state.report();
    assert_eq!(report.outcome, Some(Outcome::Success));
    assert_eq!(report.attempts, 1);
    assert_eq!(report.stdout, "720\n");
    assert_eq!(report.program.as_deref(), Some(FACTORIAL));
}

#[test]
fn typo_is_repaired_from_real_traceback() {
    require_python!();
    let generator = ScriptedGenerator::texts([fenced(FACTORIAL_TYPO), fenced(FACTORIAL)]);

    let state = run_task("compute 6 factorial", &generator, &executor(), &config(3), |_| {})
        .expect("run");
    assert_eq!(state.outcome(), Some(Outcome::Success));
    assert_eq!(state.attempts(), 2);
    assert_eq!(state.last_result().expect("result").stdout, "720\n");

    let requests = generator.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].user.contains("NameError"));
    assert!(requests[1].user.contains("prnt(result)"));
}

#[test]
fn blocked_import_is_repaired_without_launch() {
    require_python!();
    let generator = ScriptedGenerator::texts([
        fenced("import math\nprint(math.factorial(6))"),
        fenced(FACTORIAL),
    ]);

    let state = run_task("compute 6 factorial", &generator, &executor(), &config(3), |_| {})
        .expect("run");
    assert_eq!(state.outcome(), Some(Outcome::Success));
    assert_eq!(state.attempts(), 2);
    assert!(generator.requests()[1].user.contains("blocked"));
}

#[test]
fn persistent_failure_exhausts_budget_with_last_output() {
    require_python!();
    let generator = ScriptedGenerator::texts([fenced("print(1/0)"), fenced("print(10/0)")]);

    let state = run_task("divide by zero", &generator, &executor(), &config(2), |_| {})
        .expect("run");
    let report = state.report();
    assert_eq!(report.outcome, Some(Outcome::Exhausted));
    assert_eq!(report.attempts, 2);
    assert_eq!(report.exit_reason, Some(ExitReason::Crashed));
    assert_eq!(report.program.as_deref(), Some("print(10/0)"));
    assert!(report.stderr.contains("ZeroDivisionError"));
}

#[test]
fn timeout_counts_as_an_attempt() {
    require_python!();
    let generator =
        ScriptedGenerator::texts([fenced("while True:\n    pass"), fenced("print(720)")]);
    let config = DriverConfig {
        retry_budget: 2,
        attempt_timeout: Duration::from_secs(1),
    };

    let state = run_task("compute 6 factorial", &generator, &executor(), &config, |_| {})
        .expect("run");
    assert_eq!(state.outcome(), Some(Outcome::Success));
    assert_eq!(state.attempts(), 2);
    assert!(generator.requests()[1].user.contains("timeout"));
}
