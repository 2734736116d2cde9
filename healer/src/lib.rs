//! Self-healing code generation loop.
//!
//! A task description goes to a text generator, the program extracted from
//! its answer runs in a fresh interpreter process, and failures are fed back
//! for repair until an attempt succeeds or the retry budget is spent. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (run state, extraction, blocklist,
//!   phase decisions). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (process execution, generators,
//!   prompt rendering, configuration). Isolated behind traits for tests.
//!
//! [`driver`] coordinates the two to implement `healer run`.

pub mod core;
pub mod driver;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
