//! Expansion of stub nodes into child fragments via the language model.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::reply::parse_reply;
use crate::core::split::{Violation, split, validate};
use crate::core::tree::{CodeTree, NodeId};
use crate::core::variables::{discover_variables, render_variables};
use crate::fragment::Namespace;
use crate::io::prompt::{ExpandInputs, PromptEngine};
use crate::io::resources::EnvResources;
use crate::model::ModelClient;

/// Added to every prompt after a rejected reply.
pub const GENERAL_HINT: &str = "Your previous expansion produced syntactically invalid code and/or included disallowed constructs (e.g., def/async def). Strictly follow the rules: output valid code only, and do not define functions.";
pub const SYNTAX_HINT: &str = "A previous reply contained a statement that is incomplete or does not parse. Every top-level statement must be complete on its own.";
pub const DISALLOWED_HINT: &str = "A previous reply defined a function. Do not use def, async def or lambda; call a descriptive placeholder function instead.";

/// Child code produced for one stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Empty when the model replied without code; the stub is then skipped.
    pub blocks: Vec<String>,
}

pub struct Expander {
    model: Arc<dyn ModelClient>,
    prompts: PromptEngine,
    resources: EnvResources,
    primitive_name: String,
    max_rewrite: usize,
    cost: f64,
}

impl Expander {
    pub fn new(
        model: Arc<dyn ModelClient>,
        resources: EnvResources,
        primitive_name: impl Into<String>,
        max_rewrite: usize,
    ) -> Result<Self> {
        Ok(Self {
            model,
            prompts: PromptEngine::new()?,
            resources,
            primitive_name: primitive_name.into(),
            max_rewrite,
            cost: 0.0,
        })
    }

    /// Total model spend so far, in USD.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Ask the model to expand node `id`. Reasoning from every reply is recorded
    /// on the node. Returns `None` once more than `max_rewrite` replies have been
    /// rejected.
    #[instrument(skip_all, fields(node_id = %tree.node(id).uid, depth = tree.node(id).depth))]
    pub async fn expand(
        &mut self,
        tree: &mut CodeTree,
        id: NodeId,
        namespace: &mut Namespace,
    ) -> Result<Option<Expansion>> {
        let code = tree.node(id).code.clone();
        let names = discover_variables(&code, namespace).context("discover stub variables")?;
        let variables = render_variables(&names, namespace);

        let mut retries = 0usize;
        let mut seen = BTreeSet::new();
        loop {
            let inputs = ExpandInputs {
                primitive: self.primitive_name.clone(),
                available_actions: self.resources.actions.clone(),
                examples: self.resources.fewshots.clone(),
                task: code.clone(),
                variables: variables.clone(),
                hints: hints_for(&seen),
            };
            let prompt = self.prompts.render_expand(&inputs)?;
            debug!(prompt_bytes = prompt.len(), retries, "requesting expansion");
            let generation = self
                .model
                .generate(&prompt)
                .await
                .context("generate expansion")?;
            self.cost += generation.cost;

            let reply = parse_reply(&generation.text);
            tree.set_reasoning(id, reply.thought);
            let checked = split(&reply.code).and_then(|blocks| validate(&blocks).map(|()| blocks));
            match checked {
                Ok(blocks) => {
                    info!(children = blocks.len(), retries, "expanded");
                    return Ok(Some(Expansion { blocks }));
                }
                Err(err) => {
                    retries += 1;
                    seen.insert(err.category());
                    if retries > self.max_rewrite {
                        warn!(error = %err, max_rewrite = self.max_rewrite, "giving up on expansion");
                        return Ok(None);
                    }
                    info!(error = %err, retries, max_rewrite = self.max_rewrite, "re-asking for expansion");
                }
            }
        }
    }
}

/// The general hint plus one hint per violation category seen so far.
fn hints_for(seen: &BTreeSet<Violation>) -> Vec<String> {
    if seen.is_empty() {
        return Vec::new();
    }
    let mut hints = vec![GENERAL_HINT.to_string()];
    hints.extend(seen.iter().map(|violation| {
        match violation {
            Violation::Syntax => SYNTAX_HINT,
            Violation::Disallowed => DISALLOWED_HINT,
        }
        .to_string()
    }));
    hints
}
