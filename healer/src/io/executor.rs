//! Isolated execution primitive.
//!
//! The [`Executor`] trait decouples the driver from how programs are run.
//! [`SubprocessExecutor`] materializes each program in a fresh temporary
//! directory and runs it in a newly started interpreter process with a
//! wall-clock timeout. Tests use scripted executors that return
//! predetermined results without spawning processes.
//!
//! Two independent layers apply, and neither is a sandbox:
//! - a pre-execution [`Blocklist`] (see [`BLOCKLIST_LIMITATION`]);
//! - process isolation: a new process per call, a per-call scratch
//!   directory removed on every exit path, and a hard timeout.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::blocklist::{BLOCKLIST_LIMITATION, Blocklist};
use crate::core::types::{ExecutionResult, ExitReason};
use crate::io::process::run_command_with_timeout;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 100_000;

const PROGRAM_FILE: &str = "program.py";
const NO_OUTPUT_NOTICE: &str =
    "program exited successfully but wrote nothing to stdout; print the result explicitly\n";

/// Abstraction over program execution backends.
pub trait Executor {
    /// Run `program` once, bounded by `timeout`, and classify the outcome.
    ///
    /// `Err` is reserved for failures of the launcher itself (missing
    /// interpreter, temp directory errors); program failures are reported in
    /// the returned [`ExecutionResult`].
    fn execute(&self, program: &str, timeout: Duration) -> Result<ExecutionResult>;
}

/// Settings for [`SubprocessExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Interpreter argv; the program file path is appended.
    pub interpreter: Vec<String>,
    /// Bytes of stdout/stderr kept per stream.
    pub output_limit_bytes: usize,
    /// Judge a zero-exit run that printed nothing as crashed.
    pub require_output: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            interpreter: vec!["python3".to_string(), "-I".to_string()],
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            require_output: true,
        }
    }
}

/// Executor that runs each program in a fresh interpreter process.
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    settings: ExecutorSettings,
    blocklist: Blocklist,
}

impl SubprocessExecutor {
    pub fn new(settings: ExecutorSettings, blocklist: Blocklist) -> Self {
        Self {
            settings,
            blocklist,
        }
    }

    /// Callers get the blocklist limitation verbatim.
    pub fn limitation(&self) -> &'static str {
        BLOCKLIST_LIMITATION
    }

    fn command(&self, program_path: &Path, workdir: &Path) -> Result<Command> {
        let (program, args) = self
            .settings
            .interpreter
            .split_first()
            .ok_or_else(|| anyhow!("interpreter command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(program_path)
            .current_dir(workdir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONIOENCODING", "utf-8");
        Ok(cmd)
    }
}

impl Executor for SubprocessExecutor {
    #[instrument(
        skip_all,
        fields(
            timeout_ms = timeout.as_millis() as u64,
            program_bytes = program.len(),
            blocklist_rules = self.blocklist.len()
        )
    )]
    fn execute(&self, program: &str, timeout: Duration) -> Result<ExecutionResult> {
        if let Some(found) = self.blocklist.check(program) {
            info!(rule = %found.rule, line = found.line, "program blocked before launch");
            return Ok(ExecutionResult::blocked(found.describe()));
        }

        // Dropped on every return path below, including after a forced kill.
        let scratch = tempfile::Builder::new()
            .prefix("healer-exec-")
            .tempdir()
            .context("create scratch dir")?;
        let program_path = scratch.path().join(PROGRAM_FILE);
        fs::write(&program_path, program)
            .with_context(|| format!("write program {}", program_path.display()))?;

        let cmd = self.command(&program_path, scratch.path())?;
        let output =
            run_command_with_timeout(cmd, None, timeout, self.settings.output_limit_bytes)
                .context("run program")?;

        let stdout = output.stdout_text("program");
        let mut stderr = output.stderr_text("program");

        let (succeeded, exit_reason) = if output.timed_out {
            warn!(timeout_ms = timeout.as_millis() as u64, "program timed out");
            stderr.push_str(&format!(
                "\n[program killed after exceeding {timeout:?} timeout]\n"
            ));
            (false, ExitReason::Timeout)
        } else if !output.status.success() {
            debug!(exit_code = ?output.status.code(), "program crashed");
            (false, ExitReason::Crashed)
        } else if self.settings.require_output && output.stdout.is_empty() {
            debug!("program exited cleanly without output");
            stderr.push_str(NO_OUTPUT_NOTICE);
            (false, ExitReason::Crashed)
        } else {
            (true, ExitReason::Normal)
        };

        debug!(
            succeeded,
            exit_reason = exit_reason.as_str(),
            elapsed_ms = output.elapsed.as_millis() as u64,
            "program finished"
        );
        Ok(ExecutionResult {
            succeeded,
            stdout,
            stderr,
            exit_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blocklist::default_rules;

    fn executor() -> SubprocessExecutor {
        SubprocessExecutor::new(
            ExecutorSettings::default(),
            Blocklist::new(&default_rules()).expect("blocklist"),
        )
    }

    #[test]
    fn blocked_program_never_launches() {
        // A missing interpreter would error if a launch were attempted.
        let executor = SubprocessExecutor::new(
            ExecutorSettings {
                interpreter: vec!["healer-no-such-interpreter".to_string()],
                ..ExecutorSettings::default()
            },
            Blocklist::new(&default_rules()).expect("blocklist"),
        );

        let result = executor
            .execute("import os\nprint(os.getcwd())", DEFAULT_TIMEOUT)
            .expect("execute");
        assert!(!result.succeeded);
        assert_eq!(result.exit_reason, ExitReason::Blocked);
        assert!(result.stdout.is_empty());
        assert!(result.stderr.contains("import statement"));
    }

    #[test]
    fn blocked_rejection_is_idempotent() {
        let executor = executor();
        let program = "print(open('secret.txt').read())";
        let first = executor.execute(program, DEFAULT_TIMEOUT).expect("first");
        let second = executor.execute(program, DEFAULT_TIMEOUT).expect("second");
        assert_eq!(first, second);
        assert_eq!(first.exit_reason, ExitReason::Blocked);
    }

    #[test]
    fn empty_interpreter_is_launcher_error() {
        let executor = SubprocessExecutor::new(
            ExecutorSettings {
                interpreter: Vec::new(),
                ..ExecutorSettings::default()
            },
            Blocklist::empty(),
        );
        let err = executor.execute("print(1)", DEFAULT_TIMEOUT).unwrap_err();
        assert!(err.to_string().contains("interpreter command is empty"));
    }

    #[test]
    fn missing_interpreter_is_launcher_error() {
        let executor = SubprocessExecutor::new(
            ExecutorSettings {
                interpreter: vec!["healer-no-such-interpreter".to_string()],
                ..ExecutorSettings::default()
            },
            Blocklist::empty(),
        );
        assert!(executor.execute("print(1)", DEFAULT_TIMEOUT).is_err());
    }

    #[test]
    fn limitation_is_exposed_verbatim() {
        assert_eq!(executor().limitation(), BLOCKLIST_LIMITATION);
    }
}
