//! Text-completion backends.
//!
//! The [`Generator`] trait is the only contract the driver has with the
//! model: system instructions plus user content in, generated text out.
//! Backends are built in two phases. Construction never reads required
//! configuration (API keys, binaries); the first [`Generator::generate`]
//! call does, and reports [`GenerateError::ConfigurationMissing`] when it is
//! absent.

use std::io::ErrorKind;
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::io::process::run_command_with_timeout;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_GENERATOR_TIMEOUT: Duration = Duration::from_secs(120);

const COMMAND_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// One completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("configuration missing: {what}")]
    ConfigurationMissing { what: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("backend failed: {0}")]
    Backend(String),
    #[error("generator returned no text")]
    EmptyResponse,
}

/// Abstraction over text-completion services.
///
/// Implementations are shared read-only between concurrent runs.
pub trait Generator {
    fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError>;
}

/// OpenAI-compatible `/chat/completions` backend.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::blocking::Client,
    api_base: String,
    api_key_env: String,
    model: String,
    temperature: Option<f32>,
    timeout: Duration,
}

impl OpenAiGenerator {
    /// Build a handle. Does not read the API key.
    ///
    /// The HTTP client (and its connection pool) is created once here and
    /// reused by every request.
    pub fn new(api_key_env: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key_env: api_key_env.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            timeout: DEFAULT_GENERATOR_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_key(&self) -> Result<String, GenerateError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(GenerateError::ConfigurationMissing {
                what: format!("environment variable {} is not set", self.api_key_env),
            }),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    fn payload(&self, request: &GenerateRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            temperature: self.temperature,
        }
    }
}

impl Generator for OpenAiGenerator {
    #[instrument(skip_all, fields(model = %self.model))]
    fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError> {
        let api_key = self.api_key()?;
        let payload = self.payload(request);
        debug!(
            messages_count = payload.messages.len(),
            "sending chat completion request"
        );
        let response = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .map_err(|err| GenerateError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            error!(status = %status, "chat completion failed");
            return Err(GenerateError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .map_err(|err| GenerateError::Transport(format!("parse response: {err}")))?;
        first_choice_text(body)
    }
}

fn first_choice_text(response: ChatCompletionResponse) -> Result<String, GenerateError> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(GenerateError::EmptyResponse);
    }
    debug!(chars = text.len(), "chat completion received");
    Ok(text)
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Backend that pipes the prompt into a local CLI (e.g. `codex exec -`)
/// and takes its stdout as the generated text.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn render_stdin(request: &GenerateRequest) -> String {
        format!("{}\n\n{}\n", request.system.trim_end(), request.user.trim_end())
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(command = ?self.command.first()))]
    fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError> {
        let (program, args) =
            self.command
                .split_first()
                .ok_or_else(|| GenerateError::ConfigurationMissing {
                    what: "generator command is empty".to_string(),
                })?;
        let mut cmd = Command::new(program);
        cmd.args(args);

        let stdin = Self::render_stdin(request);
        let output = run_command_with_timeout(
            cmd,
            Some(stdin.as_bytes()),
            self.timeout,
            COMMAND_OUTPUT_LIMIT_BYTES,
        )
        .map_err(|err| {
            let not_found = err
                .chain()
                .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
                .any(|io| io.kind() == ErrorKind::NotFound);
            if not_found {
                GenerateError::ConfigurationMissing {
                    what: format!("generator command `{program}` not found"),
                }
            } else {
                GenerateError::Backend(format!("{err:#}"))
            }
        })?;

        if output.timed_out {
            return Err(GenerateError::Backend(format!(
                "`{program}` timed out after {:?}",
                self.timeout
            )));
        }
        if !output.status.success() {
            return Err(GenerateError::Backend(format!(
                "`{program}` exited with status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(GenerateError::EmptyResponse);
        }
        Ok(text)
    }
}
