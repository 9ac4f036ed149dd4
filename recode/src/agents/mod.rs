//! The attempt loop and the model-backed expansion it relies on.

pub mod expander;
pub mod orchestrator;

pub use expander::{Expander, Expansion};
pub use orchestrator::{EpisodeInfo, Orchestrator, ROOT_CODE};
