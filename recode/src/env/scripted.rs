//! Data-driven text world loaded from a TOML task file.
//!
//! ```toml
//! name = "household"
//! task_type = "put"
//! initial = "You are in the middle of a room...\nYour task is to: put a mug on the desk."
//! max_steps = 50
//!
//! [[transitions]]
//! action = "go to desk 1"
//! observation = "On the desk 1, you see a mug 1."
//!
//! [[transitions]]
//! action = "put mug 1 in/on desk 1"
//! observation = "You put the mug 1 in/on the desk 1."
//! success = true
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::env::{EnvError, EnvKind, Environment};

/// Action that ends the episode without success.
pub const FINISH_ACTION: &str = "[FINISH]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSpec {
    pub name: EnvKind,
    pub task_type: String,
    pub initial: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_observation")]
    pub default_observation: String,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub action: String,
    pub observation: String,
    /// Reaching this transition completes the task.
    #[serde(default)]
    pub success: bool,
}

fn default_max_steps() -> usize {
    50
}

fn default_observation() -> String {
    "Nothing happens.".to_string()
}

impl WorldSpec {
    pub fn parse(contents: &str) -> Result<Self> {
        let spec: WorldSpec = toml::from_str(contents).context("parse task toml")?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read task {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("load task {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.initial.trim().is_empty() {
            return Err(anyhow!("initial must not be empty"));
        }
        if let Some(empty) = self.transitions.iter().position(|t| t.action.trim().is_empty()) {
            return Err(anyhow!("transitions[{empty}].action must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedWorld {
    spec: WorldSpec,
    steps: usize,
    done: bool,
    success: bool,
}

impl ScriptedWorld {
    pub fn new(spec: WorldSpec) -> Self {
        Self {
            spec,
            steps: 0,
            done: false,
            success: false,
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

#[async_trait]
impl Environment for ScriptedWorld {
    async fn run_action(&mut self, action: &str) -> Result<String, EnvError> {
        if self.done {
            return Err(EnvError::Failed("the episode has already ended".to_string()));
        }
        self.steps += 1;
        if self.steps > self.spec.max_steps {
            self.done = true;
            return Err(EnvError::StepLimit {
                max_steps: self.spec.max_steps,
            });
        }

        let action = action.trim();
        if action == FINISH_ACTION {
            self.done = true;
            return Ok("Episode finished.".to_string());
        }
        match self.spec.transitions.iter().find(|t| t.action.trim() == action) {
            Some(transition) => {
                if transition.success {
                    info!(steps = self.steps, "task completed");
                    self.done = true;
                    self.success = true;
                }
                Ok(transition.observation.clone())
            }
            None => {
                debug!(action, "no scripted transition");
                Ok(self.spec.default_observation.clone())
            }
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn is_success(&self) -> bool {
        self.success
    }

    fn kind(&self) -> EnvKind {
        self.spec.name
    }

    fn task_type(&self) -> &str {
        &self.spec.task_type
    }

    fn initial_text(&self) -> &str {
        &self.spec.initial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASK: &str = r#"
name = "alfworld"
task_type = "put"
initial = "You are in a room.\nYour task is to: put a mug on the desk."
max_steps = 3

[[transitions]]
action = "take mug 1 from shelf 1"
observation = "You pick up the mug 1 from the shelf 1."

[[transitions]]
action = "put mug 1 in/on desk 1"
observation = "You put the mug 1 in/on the desk 1."
success = true
"#;

    #[tokio::test]
    async fn scripted_transitions_drive_success() {
        let mut world = ScriptedWorld::new(WorldSpec::parse(TASK).expect("parse"));
        assert_eq!(world.kind(), EnvKind::Household);
        assert_eq!(world.run_action("look").await.expect("look"), "Nothing happens.");
        world.run_action(" take mug 1 from shelf 1 ").await.expect("take");
        assert!(!world.is_done());
        world.run_action("put mug 1 in/on desk 1").await.expect("put");
        assert!(world.is_done());
        assert!(world.is_success());
        assert!(world.run_action("look").await.is_err());
    }

    #[tokio::test]
    async fn step_limit_ends_episode() {
        let mut world = ScriptedWorld::new(WorldSpec::parse(TASK).expect("parse"));
        for _ in 0..3 {
            world.run_action("look").await.expect("within limit");
        }
        assert_eq!(
            world.run_action("look").await,
            Err(EnvError::StepLimit { max_steps: 3 })
        );
        assert!(world.is_done());
        assert!(!world.is_success());
    }

    #[tokio::test]
    async fn finish_action_ends_without_success() {
        let mut world = ScriptedWorld::new(WorldSpec::parse(TASK).expect("parse"));
        world.run_action(FINISH_ACTION).await.expect("finish");
        assert!(world.is_done());
        assert!(!world.is_success());
    }

    #[test]
    fn rejects_zero_step_budget() {
        let err = WorldSpec::parse(&TASK.replace("max_steps = 3", "max_steps = 0")).expect_err("invalid");
        assert!(err.to_string().contains("max_steps"));
    }
}
