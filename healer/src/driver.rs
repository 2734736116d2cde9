//! Self-healing run loop.
//!
//! [`run_task`] walks the [`Phase`] machine for one task: ask the generator
//! for a program, run it, and either stop or feed the failure back into the
//! next generation until an attempt succeeds or the retry budget is spent.
//! One run is sequential and blocking; independent runs may share the same
//! generator and executor from separate threads.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::extract::Generation;
use crate::core::machine::{Phase, decide_after_execute};
use crate::core::types::{ExecutionResult, Outcome, RunState, TransitionError};
use crate::error::RunError;
use crate::io::config::HealerConfig;
use crate::io::executor::Executor;
use crate::io::generator::Generator;
use crate::io::prompt::{PromptBuilder, RepairContext};

/// Knobs the driver itself consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Maximum executor invocations for one run.
    pub retry_budget: u32,
    /// Wall-clock bound handed to the executor for each attempt.
    pub attempt_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&HealerConfig> for DriverConfig {
    fn from(cfg: &HealerConfig) -> Self {
        Self {
            retry_budget: cfg.retry_budget,
            attempt_timeout: cfg.attempt_timeout(),
        }
    }
}

/// Progress notifications, one per transition.
#[derive(Debug, Clone, Copy)]
pub enum RunEvent<'a> {
    /// A program was extracted from generated text and is about to run.
    Generated {
        attempt: u32,
        repair: bool,
        program: &'a str,
    },
    /// An attempt finished.
    Executed {
        attempt: u32,
        result: &'a ExecutionResult,
    },
    /// The last attempt failed and budget remains.
    Repairing { attempt: u32, budget: u32 },
    /// The run reached a terminal outcome.
    Done { outcome: Outcome, attempts: u32 },
}

/// Drive one task to a terminal [`RunState`].
///
/// Failed attempts are recovered by the repair transition; only generator,
/// extraction and launcher failures end the run early with an error.
#[instrument(skip_all, fields(retry_budget = config.retry_budget))]
pub fn run_task<G, E, F>(
    task: &str,
    generator: &G,
    executor: &E,
    config: &DriverConfig,
    mut on_event: F,
) -> Result<RunState, RunError>
where
    G: Generator + ?Sized,
    E: Executor + ?Sized,
    F: FnMut(&RunEvent<'_>),
{
    if config.retry_budget == 0 {
        return Err(RunError::ZeroBudget);
    }
    let prompts = PromptBuilder::new(config.attempt_timeout);
    let mut state = RunState::new(task);
    let mut phase = Phase::Plan;

    loop {
        debug!(?phase, attempts = state.attempts(), "driver phase");
        phase = match phase {
            Phase::Plan => {
                let repair = state.last_result().is_some();
                let request = match (state.program(), state.last_result()) {
                    (Some(program), Some(result)) => prompts.repair(
                        task,
                        RepairContext {
                            program,
                            result,
                            attempt: state.attempts(),
                            budget: config.retry_budget,
                        },
                    ),
                    _ => prompts.plan(task),
                }
                .map_err(RunError::Prompt)?;

                let text = generator.generate(&request)?;
                let generation = match Generation::parse(text.clone()) {
                    Ok(generation) => generation,
                    Err(source) => {
                        warn!(chars = text.len(), "no program in generated text");
                        return Err(RunError::Extraction {
                            source,
                            generated_text: text,
                        });
                    }
                };
                state.record_generation(generation)?;
                on_event(&RunEvent::Generated {
                    attempt: state.attempts() + 1,
                    repair,
                    program: state.program().unwrap_or_default(),
                });
                Phase::Execute
            }
            Phase::Execute => {
                let program = state.program().ok_or(TransitionError::NoProgram)?;
                let result = executor
                    .execute(program, config.attempt_timeout)
                    .map_err(RunError::Launch)?;
                info!(
                    attempt = state.attempts() + 1,
                    exit_reason = result.exit_reason.as_str(),
                    succeeded = result.succeeded,
                    "attempt finished"
                );
                state.record_execution(result)?;
                if let Some(result) = state.last_result() {
                    on_event(&RunEvent::Executed {
                        attempt: state.attempts(),
                        result,
                    });
                }
                decide_after_execute(&state, config.retry_budget)
            }
            Phase::Repair => {
                on_event(&RunEvent::Repairing {
                    attempt: state.attempts(),
                    budget: config.retry_budget,
                });
                Phase::Plan
            }
            Phase::Done(outcome) => {
                state.finish(outcome)?;
                info!(?outcome, attempts = state.attempts(), "run finished");
                on_event(&RunEvent::Done {
                    outcome,
                    attempts: state.attempts(),
                });
                return Ok(state);
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extract::ExtractError;
    use crate::core::types::ExitReason;
    use crate::io::generator::GenerateError;
    use crate::test_support::{
        ScriptedExecutor, ScriptedGenerator, crashed, fenced, normal, timed_out,
    };

    const NAME_ERROR: &str = "Traceback (most recent call last):\n  File \"program.py\", line 5, in <module>\n    prnt(result)\nNameError: name 'prnt' is not defined\n";

    fn config(retry_budget: u32) -> DriverConfig {
        DriverConfig {
            retry_budget,
            ..DriverConfig::default()
        }
    }

    fn run(
        generator: &ScriptedGenerator,
        executor: &ScriptedExecutor,
        retry_budget: u32,
    ) -> Result<RunState, RunError> {
        run_task(
            "compute 6 factorial",
            generator,
            executor,
            &config(retry_budget),
            |_| {},
        )
    }

    #[test]
    fn first_attempt_success_is_done() {
        let generator = ScriptedGenerator::texts([fenced("print(720)")]);
        let executor = ScriptedExecutor::new(vec![normal("720\n")]);

        let state = run(&generator, &executor, 3).expect("run");
        assert_eq!(state.outcome(), Some(Outcome::Success));
        assert_eq!(state.attempts(), 1);
        assert!(state.is_terminal());
        assert_eq!(state.last_result().expect("result").stdout, "720\n");
        assert_eq!(generator.requests().len(), 1);
    }

    #[test]
    fn crash_then_repair_succeeds_on_second_attempt() {
        let generator = ScriptedGenerator::texts([
            fenced("result = 1\nfor i in range(1, 7):\n    result *= i\nprnt(result)"),
            fenced("result = 1\nfor i in range(1, 7):\n    result *= i\nprint(result)"),
        ]);
        let executor = ScriptedExecutor::new(vec![crashed(NAME_ERROR), normal("720\n")]);

        let state = run(&generator, &executor, 3).expect("run");
        assert_eq!(state.outcome(), Some(Outcome::Success));
        assert_eq!(state.attempts(), 2);

        let requests = generator.requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].user.contains("NameError"));
        assert!(requests[1].user.contains(NAME_ERROR));
        assert!(requests[1].user.contains("prnt(result)"));

        let programs = executor.programs();
        assert!(programs[1].ends_with("print(result)"));
    }

    #[test]
    fn executor_calls_never_exceed_budget() {
        for budget in 1..=4 {
            let texts: Vec<String> = (0..budget)
                .map(|i| fenced(&format!("raise SystemExit({})", i + 1)))
                .collect();
            let results = (0..budget).map(|_| crashed("boom\n")).collect();
            let generator = ScriptedGenerator::texts(texts);
            let executor = ScriptedExecutor::new(results);

            let state = run(&generator, &executor, budget).expect("run");
            assert_eq!(state.outcome(), Some(Outcome::Exhausted));
            assert_eq!(state.attempts(), budget);
            assert_eq!(executor.programs().len(), budget as usize);
            assert_eq!(generator.requests().len(), budget as usize);
            assert_eq!(state.last_result().expect("result").stderr, "boom\n");
        }
    }

    #[test]
    fn zero_budget_is_rejected_before_any_call() {
        let generator = ScriptedGenerator::texts([fenced("print(720)")]);
        let executor = ScriptedExecutor::new(vec![normal("720\n")]);

        let err = run(&generator, &executor, 0).expect_err("zero budget");
        assert!(matches!(err, RunError::ZeroBudget));
        assert!(generator.requests().is_empty());
        assert!(executor.programs().is_empty());
    }

    #[test]
    fn timeout_and_blocked_results_are_repaired() {
        let generator = ScriptedGenerator::texts([
            fenced("while True:\n    pass"),
            fenced("import math\nprint(math.factorial(6))"),
            fenced("print(720)"),
        ]);
        let executor = ScriptedExecutor::new(vec![
            timed_out(""),
            ExecutionResult::blocked("blocked by rule `import statement`"),
            normal("720\n"),
        ]);

        let mut events = Vec::new();
        let state = run_task(
            "compute 6 factorial",
            &generator,
            &executor,
            &config(3),
            |event| {
                events.push(match event {
                    RunEvent::Generated {
                        attempt, repair, ..
                    } => format!("generated {attempt} {repair}"),
                    RunEvent::Executed { attempt, result } => {
                        format!("executed {attempt} {}", result.exit_reason.as_str())
                    }
                    RunEvent::Repairing { attempt, budget } => {
                        format!("repairing {attempt}/{budget}")
                    }
                    RunEvent::Done { outcome, attempts } => format!("done {outcome:?} {attempts}"),
                })
            },
        )
        .expect("run");

        assert_eq!(state.outcome(), Some(Outcome::Success));
        assert_eq!(
            events,
            vec![
                "generated 1 false",
                "executed 1 timeout",
                "repairing 1/3",
                "generated 2 true",
                "executed 2 blocked",
                "repairing 2/3",
                "generated 3 true",
                "executed 3 normal",
                "done Success 3",
            ]
        );
        let requests = generator.requests();
        assert!(requests[1].user.contains("timeout"));
        assert!(requests[2].user.contains("blocked by rule"));
    }

    #[test]
    fn bare_expression_is_wrapped_before_execution() {
        let generator = ScriptedGenerator::texts(["2+2"]);
        let executor = ScriptedExecutor::new(vec![normal("4\n")]);

        let state = run(&generator, &executor, 3).expect("run");
        assert_eq!(executor.programs(), vec!["print(2+2)".to_string()]);
        assert_eq!(state.generated_text(), Some("2+2"));
    }

    #[test]
    fn generation_failure_is_fatal_and_not_retried() {
        let generator = ScriptedGenerator::new(vec![Err(GenerateError::Upstream {
            status: 500,
            body: "oops".to_string(),
        })]);
        let executor = ScriptedExecutor::new(Vec::new());

        let err = run(&generator, &executor, 3).unwrap_err();
        assert!(matches!(err, RunError::Generation(GenerateError::Upstream { status: 500, .. })));
        assert_eq!(generator.requests().len(), 1);
        assert!(executor.programs().is_empty());
    }

    #[test]
    fn missing_configuration_surfaces_on_first_use() {
        let generator = ScriptedGenerator::new(vec![Err(GenerateError::ConfigurationMissing {
            what: "environment variable OPENAI_API_KEY is not set".to_string(),
        })]);
        let executor = ScriptedExecutor::new(Vec::new());

        let err = run(&generator, &executor, 3).unwrap_err();
        assert!(matches!(err, RunError::ConfigurationMissing { .. }));
    }

    #[test]
    fn extraction_failure_is_fatal_and_keeps_text() {
        let generator = ScriptedGenerator::texts(["```python\n\n```"]);
        let executor = ScriptedExecutor::new(Vec::new());

        match run(&generator, &executor, 3).unwrap_err() {
            RunError::Extraction {
                source,
                generated_text,
            } => {
                assert_eq!(source, ExtractError::NoCodeFound);
                assert_eq!(generated_text, "```python\n\n```");
            }
            other => panic!("expected Extraction, got {other:?}"),
        }
        assert!(executor.programs().is_empty());
    }

    #[test]
    fn extraction_failure_after_a_failed_attempt_is_still_fatal() {
        let generator = ScriptedGenerator::texts([
            fenced("prnt(1)"),
            "```\n# nothing to fix\n```".to_string(),
        ]);
        let executor = ScriptedExecutor::new(vec![crashed(NAME_ERROR)]);

        let err = run(&generator, &executor, 3).unwrap_err();
        assert!(matches!(err, RunError::Extraction { .. }));
        assert_eq!(executor.programs().len(), 1);
    }

    #[test]
    fn launcher_failure_is_fatal() {
        let generator = ScriptedGenerator::texts([fenced("print(1)")]);
        let executor = ScriptedExecutor::with_results(vec![Err(anyhow::anyhow!("spawn command"))]);

        let err = run(&generator, &executor, 3).unwrap_err();
        assert!(matches!(err, RunError::Launch(_)));
    }

    #[test]
    fn exhausted_state_carries_last_output() {
        let generator = ScriptedGenerator::texts([fenced("print(1/0)"), fenced("print(1/0)")]);
        let executor = ScriptedExecutor::new(vec![
            crashed("ZeroDivisionError: division by zero\n"),
            ExecutionResult {
                succeeded: false,
                stdout: "partial\n".to_string(),
                stderr: "ZeroDivisionError: again\n".to_string(),
                exit_reason: ExitReason::Crashed,
            },
        ]);

        let state = run(&generator, &executor, 2).expect("run");
        let report = state.report();
        assert_eq!(report.outcome, Some(Outcome::Exhausted));
        assert_eq!(report.stdout, "partial\n");
        assert_eq!(report.stderr, "ZeroDivisionError: again\n");
        assert_eq!(report.exit_reason, Some(ExitReason::Crashed));
    }
}
