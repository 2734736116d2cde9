//! Case file parsing and validation.
//!
//! Cases are TOML files defining a task and verification checks.
//! See `eval/cases/` for examples.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use healer::core::types::Outcome as RunOutcome;
use serde::Deserialize;

/// A parsed case file containing task, config, and checks.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseFile {
    pub case: CaseMeta,
    #[serde(default)]
    pub config: CaseConfig,
    #[serde(default)]
    pub checks: Vec<Check>,
}

/// Case metadata: identifier and task description.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    /// Task handed to the driver.
    pub task: String,
}

/// Healer configuration overrides for the case.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CaseConfig {
    pub retry_budget: Option<u32>,
    pub attempt_timeout_secs: Option<u64>,
}

/// Verification check applied to the final run report.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Check {
    /// The run ended with this outcome.
    OutcomeIs { outcome: RunOutcome },
    /// The last attempt's stdout contains `text`.
    StdoutContains { text: String },
    /// The run used at most `max` executor invocations.
    AttemptsAtMost { max: u32 },
}

impl CaseFile {
    /// Load and validate a case file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read case {}", path.display()))?;
        let case: CaseFile =
            toml::from_str(&contents).with_context(|| format!("parse case {}", path.display()))?;
        case.validate()
            .with_context(|| format!("validate case {}", path.display()))?;
        Ok(case)
    }

    #[cfg(test)]
    pub fn parse_str(contents: &str) -> Result<Self> {
        let case: CaseFile = toml::from_str(contents).context("parse case")?;
        case.validate()?;
        Ok(case)
    }

    fn validate(&self) -> Result<()> {
        validate_case_id(&self.case.id)?;
        if self.case.task.trim().is_empty() {
            bail!("case.task must be non-empty");
        }
        if self.config.retry_budget == Some(0) {
            bail!("config.retry_budget must be > 0");
        }
        if self.config.attempt_timeout_secs == Some(0) {
            bail!("config.attempt_timeout_secs must be > 0");
        }
        if self.checks.is_empty() {
            bail!("checks must be a non-empty array");
        }
        for (index, check) in self.checks.iter().enumerate() {
            check
                .validate()
                .with_context(|| format!("checks[{}] invalid", index))?;
        }
        Ok(())
    }
}

impl Check {
    fn validate(&self) -> Result<()> {
        match self {
            Check::StdoutContains { text } if text.is_empty() => {
                bail!("stdout_contains.text must be non-empty");
            }
            Check::AttemptsAtMost { max: 0 } => bail!("attempts_at_most.max must be > 0"),
            _ => {}
        }
        Ok(())
    }
}

/// Discover and load all case files from a directory.
///
/// Returns cases sorted by id. Errors if duplicate ids are found.
pub fn discover_cases(dir: &Path) -> Result<Vec<CaseFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut cases = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read cases dir {}", dir.display()))? {
        let entry = entry.context("read case entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        cases.push(CaseFile::load(&path)?);
    }
    cases.sort_by(|left, right| left.case.id.cmp(&right.case.id));
    for pair in cases.windows(2) {
        if pair[0].case.id == pair[1].case.id {
            return Err(anyhow!("duplicate case.id {}", pair[0].case.id));
        }
    }
    Ok(cases)
}

fn validate_case_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("case.id must be non-empty");
    }
    if id.contains('/') || id.contains('\\') {
        bail!("case.id must not contain path separators");
    }
    if id.contains("..") {
        bail!("case.id must not contain '..'");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("case.id must use [a-z0-9_-] only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_case() {
        let input = r#"
[case]
id = "factorial"
task = "compute 6 factorial"

[config]
retry_budget = 2
attempt_timeout_secs = 5

[[checks]]
type = "outcome_is"
outcome = "success"

[[checks]]
type = "stdout_contains"
text = "720"

[[checks]]
type = "attempts_at_most"
max = 2
"#;
        let case = CaseFile::parse_str(input).expect("case parses");
        assert_eq!(case.case.id, "factorial");
        assert_eq!(case.config.retry_budget, Some(2));
        assert_eq!(case.checks.len(), 3);
        assert_eq!(
            case.checks[0],
            Check::OutcomeIs {
                outcome: RunOutcome::Success
            }
        );
    }

    #[test]
    fn rejects_invalid_id() {
        let input = r#"
[case]
id = "bad/id"
task = "do the thing"

[[checks]]
type = "outcome_is"
outcome = "success"
"#;
        let err = CaseFile::parse_str(input).expect_err("invalid id");
        assert!(err.to_string().contains("case.id"));
    }

    #[test]
    fn rejects_malformed_checks() {
        let input = r#"
[case]
id = "factorial"
task = "compute 6 factorial"

[[checks]]
type = "attempts_at_most"
max = 0
"#;
        let _err = CaseFile::parse_str(input).expect_err("invalid check");
    }

    #[test]
    fn discovers_cases_sorted() {
        let temp = tempfile::tempdir().expect("tempdir");
        for id in ["b-case", "a-case"] {
            fs::write(
                temp.path().join(format!("{id}.toml")),
                format!("[case]\nid = \"{id}\"\ntask = \"x\"\n\n[[checks]]\ntype = \"stdout_contains\"\ntext = \"1\"\n"),
            )
            .expect("write case");
        }
        fs::write(temp.path().join("README.md"), "ignored").expect("write readme");

        let cases = discover_cases(temp.path()).expect("discover");
        let ids: Vec<&str> = cases.iter().map(|case| case.case.id.as_str()).collect();
        assert_eq!(ids, vec!["a-case", "b-case"]);
    }
}
