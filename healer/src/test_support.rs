//! Scripted collaborators for driver tests.
//!
//! Both fakes pop predetermined responses in order and record what they were
//! asked, so tests can assert on prompts and programs without a model or an
//! interpreter.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::types::{ExecutionResult, ExitReason};
use crate::io::executor::Executor;
use crate::io::generator::{GenerateError, GenerateRequest, Generator};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Generator that replays scripted responses.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, GenerateError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<String, GenerateError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script that answers every call with the next text.
    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|text| Ok(text.into())).collect())
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        lock(&self.requests).clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError> {
        lock(&self.requests).push(request.clone());
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| {
                Err(GenerateError::Backend(
                    "generator script exhausted".to_string(),
                ))
            })
    }
}

/// Executor that replays scripted results without spawning processes.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    results: Mutex<VecDeque<Result<ExecutionResult>>>,
    programs: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self::with_results(results.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ExecutionResult>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            programs: Mutex::new(Vec::new()),
        }
    }

    /// Programs executed so far, in order.
    pub fn programs(&self) -> Vec<String> {
        lock(&self.programs).clone()
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, program: &str, _timeout: Duration) -> Result<ExecutionResult> {
        lock(&self.programs).push(program.to_string());
        lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("executor script exhausted")))
    }
}

/// Wrap `code` the way models usually answer: a plan line and a fenced block.
pub fn fenced(code: &str) -> String {
    format!("Plan: compute it directly.\n\n```python\n{code}\n```\n")
}

pub fn normal(stdout: &str) -> ExecutionResult {
    ExecutionResult {
        succeeded: true,
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_reason: ExitReason::Normal,
    }
}

pub fn crashed(stderr: &str) -> ExecutionResult {
    ExecutionResult {
        succeeded: false,
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_reason: ExitReason::Crashed,
    }
}

pub fn timed_out(stdout: &str) -> ExecutionResult {
    ExecutionResult {
        succeeded: false,
        stdout: stdout.to_string(),
        stderr: "[program killed after exceeding 10s timeout]\n".to_string(),
        exit_reason: ExitReason::Timeout,
    }
}

/// Whether a `python3` interpreter can be launched on this machine.
///
/// Subprocess tests return early with a message when it cannot.
pub fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
