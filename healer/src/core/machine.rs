//! Retry state machine: phases and the post-execution decision.
//!
//! ```text
//! Plan -> Execute -> Done(Success)
//!                 -> Done(Exhausted)      attempts >= retry_budget
//!                 -> Repair -> Plan -> Execute -> ...
//! ```
//!
//! `Done` is terminal. The decision is a pure function of [`RunState`] so it
//! can be tested without any collaborator.

use crate::core::types::{Outcome, RunState};

/// Driver phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Ask the generator for a program (fresh, or repair when a result exists).
    Plan,
    /// Run the current program.
    Execute,
    /// Carry the failing program and its result into the next `Plan`.
    Repair,
    /// Terminal.
    Done(Outcome),
}

/// Decide the phase that follows `Execute`.
///
/// Success wins over budget exhaustion: a last attempt that succeeds is a
/// success. Without a recorded result the run cannot have executed, so the
/// state is sent back to `Plan`.
pub fn decide_after_execute(state: &RunState, retry_budget: u32) -> Phase {
    let Some(result) = state.last_result() else {
        return Phase::Plan;
    };
    if result.succeeded {
        Phase::Done(Outcome::Success)
    } else if state.attempts() >= retry_budget {
        Phase::Done(Outcome::Exhausted)
    } else {
        Phase::Repair
    }
}
