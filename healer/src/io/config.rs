//! Healer configuration stored in `healer.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::blocklist::{BlockRuleConfig, Blocklist, default_rules};
use crate::io::executor::{ExecutorSettings, SubprocessExecutor};
use crate::io::generator::{
    CommandGenerator, DEFAULT_API_BASE, DEFAULT_API_KEY_ENV, DEFAULT_MODEL, GenerateError,
    GenerateRequest, Generator, OpenAiGenerator,
};

pub const DEFAULT_CONFIG_FILE: &str = "healer.toml";

/// Healer configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// the values in [`HealerConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealerConfig {
    /// Maximum executor invocations per run.
    pub retry_budget: u32,

    /// Wall-clock limit for one program execution, in seconds.
    pub attempt_timeout_secs: u64,

    /// Truncate program stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,

    /// Treat a clean exit with empty stdout as a crash.
    pub require_output: bool,

    /// Interpreter argv; the program path is appended.
    pub interpreter: Vec<String>,

    /// Ordered pre-execution deny rules.
    pub blocklist: Vec<BlockRuleConfig>,

    pub generator: GeneratorConfig,
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            attempt_timeout_secs: 10,
            output_limit_bytes: 100_000,
            require_output: true,
            interpreter: vec!["python3".to_string(), "-I".to_string()],
            blocklist: default_rules(),
            generator: GeneratorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// OpenAI-compatible chat completions over HTTP.
    Openai,
    /// Local CLI fed the prompt on stdin.
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub backend: GeneratorBackend,
    pub model: String,
    pub api_base: String,
    /// Name of the environment variable holding the API key (read lazily).
    pub api_key_env: String,
    pub temperature: Option<f32>,
    /// Command for the `command` backend (e.g. `["codex","exec","-"]`).
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::Openai,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: Some(0.0),
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            timeout_secs: 120,
        }
    }
}

impl HealerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retry_budget == 0 {
            return Err(anyhow!("retry_budget must be > 0"));
        }
        if self.attempt_timeout_secs == 0 {
            return Err(anyhow!("attempt_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.interpreter.is_empty() || self.interpreter[0].trim().is_empty() {
            return Err(anyhow!("interpreter must be a non-empty array"));
        }
        Blocklist::new(&self.blocklist).context("blocklist")?;
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.backend == GeneratorBackend::Command
            && (self.generator.command.is_empty() || self.generator.command[0].trim().is_empty())
        {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Build the subprocess executor described by this config.
    pub fn build_executor(&self) -> Result<SubprocessExecutor> {
        let blocklist = Blocklist::new(&self.blocklist).context("compile blocklist")?;
        Ok(SubprocessExecutor::new(
            ExecutorSettings {
                interpreter: self.interpreter.clone(),
                output_limit_bytes: self.output_limit_bytes,
                require_output: self.require_output,
            },
            blocklist,
        ))
    }

    /// Build the configured generator. Never reads credentials.
    pub fn build_generator(&self) -> ConfiguredGenerator {
        let cfg = &self.generator;
        let timeout = Duration::from_secs(cfg.timeout_secs);
        match cfg.backend {
            GeneratorBackend::Openai => ConfiguredGenerator::OpenAi(
                OpenAiGenerator::new(cfg.api_key_env.clone())
                    .with_api_base(cfg.api_base.clone())
                    .with_model(cfg.model.clone())
                    .with_temperature(cfg.temperature)
                    .with_timeout(timeout),
            ),
            GeneratorBackend::Command => {
                ConfiguredGenerator::Command(CommandGenerator::new(cfg.command.clone(), timeout))
            }
        }
    }
}

/// Generator selected by configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredGenerator {
    OpenAi(OpenAiGenerator),
    Command(CommandGenerator),
}

impl Generator for ConfiguredGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError> {
        match self {
            ConfiguredGenerator::OpenAi(generator) => generator.generate(request),
            ConfiguredGenerator::Command(generator) => generator.generate(request),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HealerConfig::default()`.
pub fn load_config(path: &Path) -> Result<HealerConfig> {
    if !path.exists() {
        let cfg = HealerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HealerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &HealerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
