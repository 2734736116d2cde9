//! Stable exit codes for healer CLI commands.

/// The run succeeded (or the command completed).
pub const OK: i32 = 0;
/// A fatal pipeline error: generation, extraction, launch or invalid input.
pub const ERROR: i32 = 1;
/// `healer run` spent its retry budget, or `healer exec` ran a failing program.
pub const EXHAUSTED: i32 = 2;
/// Required configuration (API key, generator binary) was absent on first use.
pub const CONFIG_MISSING: i32 = 3;
