//! Fatal run errors.
//!
//! Failed attempts (timeout, blocked, crashed) are not errors; they are
//! recorded in [`ExecutionResult`](crate::core::types::ExecutionResult) and
//! recovered by the repair transition. Everything here ends the run.

use thiserror::Error;

use crate::core::extract::ExtractError;
use crate::core::types::TransitionError;
use crate::io::generator::GenerateError;

#[derive(Debug, Error)]
pub enum RunError {
    /// A collaborator found required configuration absent on first use.
    #[error("configuration missing: {what}")]
    ConfigurationMissing { what: String },

    /// The driver was asked to run with no attempts allowed.
    #[error("retry_budget must be > 0")]
    ZeroBudget,

    /// A prompt template failed to render.
    #[error("render prompt")]
    Prompt(#[source] anyhow::Error),

    /// The generator failed. Never retried by the driver.
    #[error("generation failed")]
    Generation(#[source] GenerateError),

    /// The generated text held no runnable code.
    #[error("could not extract a program from generated text")]
    Extraction {
        #[source]
        source: ExtractError,
        generated_text: String,
    },

    /// The executor could not launch the program at all.
    #[error("executor failed to launch program")]
    Launch(#[source] anyhow::Error),

    #[error("invalid state transition")]
    InvalidTransition(#[from] TransitionError),
}

impl From<GenerateError> for RunError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::ConfigurationMissing { what } => RunError::ConfigurationMissing { what },
            other => RunError::Generation(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_missing_is_lifted_out_of_generation() {
        let err = RunError::from(GenerateError::ConfigurationMissing {
            what: "OPENAI_API_KEY".to_string(),
        });
        assert!(
            matches!(err, RunError::ConfigurationMissing { ref what } if what == "OPENAI_API_KEY")
        );

        let err = RunError::from(GenerateError::EmptyResponse);
        assert!(matches!(err, RunError::Generation(GenerateError::EmptyResponse)));
    }

    #[test]
    fn display_chains_source() {
        let err = RunError::from(GenerateError::Upstream {
            status: 429,
            body: "rate limited".to_string(),
        });
        let chained = format!("{:#}", anyhow::Error::new(err));
        assert!(chained.contains("generation failed"));
        assert!(chained.contains("429"));
    }
}
