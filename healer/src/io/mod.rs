//! Side-effecting collaborators: processes, generators, prompts and config.

pub mod config;
pub mod executor;
pub mod generator;
pub mod process;
pub mod prompt;
