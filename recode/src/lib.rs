//! Recursive code-expansion agent for text environments.
//!
//! An attempt starts from a single abstract fragment, `solve(instruction,
//! observation)`, and grows a tree of code: each fragment is run by a small
//! interpreter, and fragments that call functions nobody has written yet are
//! expanded by a language model into child fragments. The crate is split into:
//!
//! - **[`fragment`]**: Lexer, parser and interpreter for fragments, including
//!   stub detection. Synchronous and free of I/O apart from the primitive action.
//! - **[`core`]**: Pure logic: the code tree, block splitting and validation,
//!   reply parsing, variable discovery and snapshots.
//! - **[`env`]**: Environments and the worker that serializes access to them.
//! - **[`model`]**: Language-model clients.
//! - **[`io`]**: Config, prompts, resources and snapshot files.
//!
//! [`agents`] ties them together: the expander asks the model for children and
//! the orchestrator drives an attempt turn by turn.

pub mod agents;
pub mod core;
pub mod env;
pub mod exit_codes;
pub mod fragment;
pub mod io;
pub mod logging;
pub mod model;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
