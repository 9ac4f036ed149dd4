//! File I/O: config, prompts, resources, scaffolding and snapshot storage.

pub mod config;
pub mod init;
pub mod prompt;
pub mod resources;
pub mod snapshot_store;
