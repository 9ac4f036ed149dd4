//! Text environments the agent acts in.
//!
//! An [`Environment`] is owned by an [`EnvWorker`] task; fragments reach it
//! through an [`EnvHandle`], which also serves as the evaluator's primitive.

pub mod scripted;
pub mod worker;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use scripted::{ScriptedWorld, Transition, WorldSpec};
pub use worker::{EnvHandle, EnvStatus, EnvWorker};

/// Environment families; each has its own raw observation layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvKind {
    #[serde(alias = "alfworld")]
    Household,
    #[serde(alias = "webshop")]
    Shop,
    #[serde(alias = "sciworld")]
    Science,
}

impl EnvKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvKind::Household => "household",
            EnvKind::Shop => "shop",
            EnvKind::Science => "science",
        }
    }
}

impl fmt::Display for EnvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "household" | "alfworld" => Ok(EnvKind::Household),
            "shop" | "webshop" => Ok(EnvKind::Shop),
            "science" | "sciworld" => Ok(EnvKind::Science),
            other => Err(format!("unsupported environment '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("Step limit of {max_steps} exceeded.")]
    StepLimit { max_steps: usize },
    #[error("{0}")]
    Failed(String),
    #[error("environment worker has shut down")]
    Closed,
}

impl EnvError {
    /// Exception kind seen by fragments.
    pub fn kind(&self) -> &'static str {
        match self {
            EnvError::StepLimit { .. } => "StepLimitError",
            EnvError::Failed(_) | EnvError::Closed => "EnvironmentError",
        }
    }
}

#[async_trait]
pub trait Environment: Send {
    /// Perform one action and return the observation.
    async fn run_action(&mut self, action: &str) -> Result<String, EnvError>;
    fn is_done(&self) -> bool;
    fn is_success(&self) -> bool;
    fn kind(&self) -> EnvKind;
    fn name(&self) -> &str {
        self.kind().as_str()
    }
    fn task_type(&self) -> &str;
    /// Raw text shown at the start of the episode.
    fn initial_text(&self) -> &str;
}

/// Split an environment's first raw observation into `(observation, instruction)`.
///
/// - household: line 0 is the observation; the instruction follows
///   `Your task is to:` on line 1, without its trailing period.
/// - shop: the whole trimmed text is the observation; its first line is the instruction.
/// - science: line 1 is the instruction; lines 2.. are the observation.
pub fn parse_raw_observation(raw: &str, kind: EnvKind) -> (String, String) {
    const TASK_MARKER: &str = "Your task is to:";
    match kind {
        EnvKind::Household => {
            let mut lines = raw.split('\n');
            let observation = lines.next().unwrap_or_default().to_string();
            let task_line = lines.next().unwrap_or_default();
            let instruction = match task_line.rsplit_once(TASK_MARKER) {
                Some((_, task)) => task.trim(),
                None => task_line.trim(),
            };
            let instruction = instruction.strip_suffix('.').unwrap_or(instruction);
            (observation, instruction.to_string())
        }
        EnvKind::Shop => {
            let trimmed = raw.trim();
            let instruction = trimmed.split('\n').next().unwrap_or_default().trim();
            (trimmed.to_string(), instruction.to_string())
        }
        EnvKind::Science => {
            let lines: Vec<&str> = raw.split('\n').collect();
            let instruction = lines.get(1).copied().unwrap_or_default();
            let observation = lines.get(2..).map(|rest| rest.join("\n")).unwrap_or_default();
            (observation, instruction.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn household_observation_splits_task_line() {
        let raw = "You are in the middle of a room. Looking around you, you see a desk 1.\nYour task is to: put a mug on the desk.";
        let (observation, instruction) = parse_raw_observation(raw, EnvKind::Household);
        assert_eq!(
            observation,
            "You are in the middle of a room. Looking around you, you see a desk 1."
        );
        assert_eq!(instruction, "put a mug on the desk");
    }

    #[test]
    fn shop_uses_first_line_as_instruction() {
        let raw = "\n  i need a red mug under 20 dollars\n[Search]\n";
        let (observation, instruction) = parse_raw_observation(raw, EnvKind::Shop);
        assert_eq!(instruction, "i need a red mug under 20 dollars");
        assert_eq!(observation, "i need a red mug under 20 dollars\n[Search]");
    }

    #[test]
    fn science_takes_second_line_and_rest() {
        let raw = "Task 3\nboil water\nYou are in the kitchen.\nThere is a stove.";
        let (observation, instruction) = parse_raw_observation(raw, EnvKind::Science);
        assert_eq!(instruction, "boil water");
        assert_eq!(observation, "You are in the kitchen.\nThere is a stove.");
    }

    #[test]
    fn kinds_accept_benchmark_aliases() {
        assert_eq!("alfworld".parse::<EnvKind>(), Ok(EnvKind::Household));
        assert_eq!("WebShop".parse::<EnvKind>(), Ok(EnvKind::Shop));
        assert!("travel".parse::<EnvKind>().is_err());
        let kind: EnvKind = serde_json::from_str("\"sciworld\"").expect("alias");
        assert_eq!(kind, EnvKind::Science);
    }

    #[test]
    fn step_limit_error_text() {
        let err = EnvError::StepLimit { max_steps: 50 };
        assert_eq!(err.to_string(), "Step limit of 50 exceeded.");
        assert_eq!(err.kind(), "StepLimitError");
    }
}
