//! Test-only helpers: a scripted model, small worlds, and evaluation builders.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::env::{EnvKind, Transition, WorldSpec};
use crate::fragment::{Evaluation, Outcome};
use crate::io::resources::EnvResources;
use crate::model::{Generation, ModelClient, ModelError};

/// Model that answers from a queue of canned replies and records every prompt.
/// Runs out with [`ModelError::NoReply`].
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    cost: f64,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            cost: 0.0,
        }
    }

    /// Charge `cost` USD per reply.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<Generation, ModelError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        let text = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .ok_or(ModelError::NoReply)?;
        Ok(Generation {
            text,
            cost: self.cost,
        })
    }
}

/// Household world with the given task and `(action, observation, success)` table.
pub fn household_world(task: &str, transitions: &[(&str, &str, bool)], max_steps: usize) -> WorldSpec {
    WorldSpec {
        name: EnvKind::Household,
        task_type: "put".to_string(),
        initial: format!("You are in a room.\nYour task is to: {task}."),
        max_steps,
        default_observation: "Nothing happens.".to_string(),
        transitions: transitions
            .iter()
            .map(|&(action, observation, success)| Transition {
                action: action.to_string(),
                observation: observation.to_string(),
                success,
            })
            .collect(),
    }
}

pub fn household_resources() -> EnvResources {
    EnvResources {
        actions: "go to {recep}\ntake {obj} from {recep}\nput {obj} in/on {recep}".to_string(),
        fewshots: String::new(),
    }
}

pub fn evaluation(outcome: Outcome, output: &[&str]) -> Evaluation {
    Evaluation {
        outcome,
        output: output.iter().map(|line| line.to_string()).collect(),
        actions: Vec::new(),
    }
}

pub fn stub(name: &str) -> Evaluation {
    evaluation(
        Outcome::Stub {
            name: name.to_string(),
        },
        &[],
    )
}

pub fn success(output: &[&str]) -> Evaluation {
    evaluation(Outcome::Success, output)
}
