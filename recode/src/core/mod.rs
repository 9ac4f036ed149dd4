//! Deterministic, pure logic of the expansion engine.
//!
//! Core modules are free of I/O side effects. They operate on in-memory data
//! structures and return deterministic outputs suitable for tests.

pub mod invariants;
pub mod reply;
pub mod snapshot;
pub mod split;
pub mod tree;
pub mod types;
pub mod variables;
