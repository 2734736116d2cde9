//! Shared deterministic types for the self-healing loop.
//!
//! These types define stable contracts between the driver, the executor and
//! callers. They carry no I/O and serialize to stable `snake_case` JSON.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::extract::Generation;

/// Why an execution attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The process ran to completion on its own.
    Normal,
    /// The wall-clock budget elapsed and the process was killed.
    Timeout,
    /// A static pre-check rejected the program; no process was started.
    Blocked,
    /// The process exited unsuccessfully (uncaught error, signal, no output).
    Crashed,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Normal => "normal",
            ExitReason::Timeout => "timeout",
            ExitReason::Blocked => "blocked",
            ExitReason::Crashed => "crashed",
        }
    }
}

/// Structured outcome of one executor invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_reason: ExitReason,
}

impl ExecutionResult {
    /// Result for a program rejected before launch.
    pub fn blocked(stderr: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_reason: ExitReason::Blocked,
        }
    }
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// An attempt succeeded.
    Success,
    /// The retry budget was spent without a successful attempt.
    Exhausted,
}

/// Rejected state transition. Only reachable through driver bugs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("run is already terminal")]
    Terminal,
    #[error("no program to execute")]
    NoProgram,
}

/// Mutable record threaded through one run.
///
/// Fields are private so the transition methods are the only writers:
/// `program` always comes from the latest `generated_text`, `attempts` only
/// grows, and `terminal` never flips back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunState {
    task: String,
    generated_text: Option<String>,
    program: Option<String>,
    last_result: Option<ExecutionResult>,
    attempts: u32,
    terminal: bool,
    outcome: Option<Outcome>,
}

impl RunState {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            generated_text: None,
            program: None,
            last_result: None,
            attempts: 0,
            terminal: false,
            outcome: None,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn generated_text(&self) -> Option<&str> {
        self.generated_text.as_deref()
    }

    pub fn program(&self) -> Option<&str> {
        self.program.as_deref()
    }

    pub fn last_result(&self) -> Option<&ExecutionResult> {
        self.last_result.as_ref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Store a fresh model response together with the program extracted from it.
    pub fn record_generation(&mut self, generation: Generation) -> Result<(), TransitionError> {
        self.ensure_live()?;
        let (text, program) = generation.into_parts();
        self.generated_text = Some(text);
        self.program = Some(program);
        Ok(())
    }

    /// Count one executor invocation and keep its result.
    pub fn record_execution(&mut self, result: ExecutionResult) -> Result<(), TransitionError> {
        self.ensure_live()?;
        if self.program.is_none() {
            return Err(TransitionError::NoProgram);
        }
        self.attempts += 1;
        self.last_result = Some(result);
        Ok(())
    }

    pub fn finish(&mut self, outcome: Outcome) -> Result<(), TransitionError> {
        self.ensure_live()?;
        self.terminal = true;
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Caller-facing summary; stdout/stderr are from the last attempt.
    pub fn report(&self) -> RunReport {
        let last = self.last_result.as_ref();
        RunReport {
            task: self.task.clone(),
            program: self.program.clone(),
            attempts: self.attempts,
            outcome: self.outcome,
            exit_reason: last.map(|result| result.exit_reason),
            stdout: last.map(|result| result.stdout.clone()).unwrap_or_default(),
            stderr: last.map(|result| result.stderr.clone()).unwrap_or_default(),
        }
    }

    fn ensure_live(&self) -> Result<(), TransitionError> {
        if self.terminal {
            return Err(TransitionError::Terminal);
        }
        Ok(())
    }
}

/// Observable record of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub task: String,
    pub program: Option<String>,
    pub attempts: u32,
    pub outcome: Option<Outcome>,
    pub exit_reason: Option<ExitReason>,
    pub stdout: String,
    pub stderr: String,
}
