//! Expansion prompt rendering.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

const EXPAND_TEMPLATE: &str = include_str!("prompts/expand.md");

const NO_EXAMPLES: &str = "(No Examples)";
const NO_VARIABLES: &str = "(No Variables)";

/// Everything the expansion template needs for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandInputs {
    pub primitive: String,
    pub available_actions: String,
    pub examples: String,
    /// Code of the stub being expanded.
    pub task: String,
    /// Rendered `- name (type): value` lines.
    pub variables: String,
    /// Corrective notes appended after rejected replies.
    pub hints: Vec<String>,
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("expand", EXPAND_TEMPLATE)
            .context("load expand template")?;
        Ok(Self { env })
    }

    pub fn render_expand(&self, inputs: &ExpandInputs) -> Result<String> {
        let template = self.env.get_template("expand")?;
        let rendered = template.render(context! {
            primitive => inputs.primitive.as_str(),
            available_actions => inputs.available_actions.trim(),
            examples => or_placeholder(&inputs.examples, NO_EXAMPLES),
            task => inputs.task.trim(),
            variables => or_placeholder(&inputs.variables, NO_VARIABLES),
            hints => &inputs.hints,
        })?;
        debug!(bytes = rendered.len(), hints = inputs.hints.len(), "rendered expand prompt");
        Ok(rendered)
    }
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    let trimmed = text.trim();
    if trimmed.is_empty() { placeholder } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ExpandInputs {
        ExpandInputs {
            primitive: "run".to_string(),
            available_actions: "go to {recep}\ntake {obj} from {recep}\n".to_string(),
            examples: String::new(),
            task: "solve(instruction, observation)".to_string(),
            variables: "- instruction (str): put a mug on the desk".to_string(),
            hints: Vec::new(),
        }
    }

    #[test]
    fn renders_task_variables_and_placeholders() {
        let engine = PromptEngine::new().expect("engine");
        let prompt = engine.render_expand(&inputs()).expect("render");
        assert!(prompt.contains("go to {recep}"));
        assert!(prompt.contains("`run(action)`"));
        assert!(prompt.contains("solve(instruction, observation)"));
        assert!(prompt.contains("- instruction (str): put a mug on the desk"));
        assert!(prompt.contains(NO_EXAMPLES));
        assert!(!prompt.contains("[Important]"));
    }

    #[test]
    fn renders_each_hint() {
        let engine = PromptEngine::new().expect("engine");
        let mut input = inputs();
        input.variables.clear();
        input.hints = vec!["first".to_string(), "second".to_string()];
        let prompt = engine.render_expand(&input).expect("render");
        assert!(prompt.contains(NO_VARIABLES));
        assert!(prompt.contains("[Important] first"));
        assert!(prompt.contains("[Important] second"));
    }
}
