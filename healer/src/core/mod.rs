//! Deterministic, pure logic shared by the self-healing loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod blocklist;
pub mod extract;
pub mod machine;
pub mod types;
