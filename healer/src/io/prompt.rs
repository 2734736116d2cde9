//! Prompt rendering for plan and repair requests.

use std::time::Duration;

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::types::ExecutionResult;
use crate::io::generator::GenerateRequest;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");

const EMPTY_STREAM: &str = "(empty)";

/// What the failed attempt left behind, fed into the repair prompt.
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub program: &'a str,
    pub result: &'a ExecutionResult,
    pub attempt: u32,
    pub budget: u32,
}

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
    attempt_timeout: Duration,
}

impl PromptBuilder {
    pub fn new(attempt_timeout: Duration) -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("plan", PLAN_TEMPLATE)
            .expect("plan template should be valid");
        env.add_template("repair", REPAIR_TEMPLATE)
            .expect("repair template should be valid");
        Self {
            env,
            attempt_timeout,
        }
    }

    /// First request of a run: the task alone.
    pub fn plan(&self, task: &str) -> Result<GenerateRequest> {
        let user = self.env.get_template("plan")?.render(context! {
            task => task.trim(),
        })?;
        Ok(GenerateRequest {
            system: self.system()?,
            user,
        })
    }

    /// Repair request: the task plus the failing program and its output, verbatim.
    pub fn repair(&self, task: &str, repair: RepairContext<'_>) -> Result<GenerateRequest> {
        let user = self.env.get_template("repair")?.render(context! {
            task => task.trim(),
            attempt => repair.attempt,
            budget => repair.budget,
            exit_reason => repair.result.exit_reason.as_str(),
            program => repair.program,
            stdout => or_empty(&repair.result.stdout),
            stderr => or_empty(&repair.result.stderr),
        })?;
        Ok(GenerateRequest {
            system: self.system()?,
            user,
        })
    }

    fn system(&self) -> Result<String> {
        let rendered = self.env.get_template("system")?.render(context! {
            timeout_secs => self.attempt_timeout.as_secs(),
        })?;
        Ok(rendered)
    }
}

fn or_empty(stream: &str) -> &str {
    if stream.is_empty() { EMPTY_STREAM } else { stream }
}
