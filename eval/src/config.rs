//! Healer configuration merging.
//!
//! Applies case-specific overrides to the base healer configuration.

use anyhow::Result;
use healer::io::config::HealerConfig;

use crate::case::CaseConfig;

/// Apply case configuration overrides to the base healer config.
pub fn apply_case_config(mut base: HealerConfig, overrides: &CaseConfig) -> Result<HealerConfig> {
    if let Some(retry_budget) = overrides.retry_budget {
        base.retry_budget = retry_budget;
    }
    if let Some(attempt_timeout_secs) = overrides.attempt_timeout_secs {
        base.attempt_timeout_secs = attempt_timeout_secs;
    }
    base.validate()?;
    Ok(base)
}
