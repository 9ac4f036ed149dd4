//! Turn-by-turn driver of one attempt: evaluate pending nodes, expand stubs.

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::agents::expander::Expander;
use crate::core::snapshot::{PlanSnapshot, SnapshotMeta};
use crate::core::tree::{CodeTree, NodeId, NodeStatus};
use crate::core::types::{AttemptReport, StopReason};
use crate::env::{EnvHandle, EnvKind, Environment, parse_raw_observation};
use crate::fragment::{Evaluator, Namespace, Outcome, Value};
use crate::io::config::{AgentConfig, RecodeConfig};

/// Code of the root fragment; both names are seeded before the first turn.
pub const ROOT_CODE: &str = "solve(instruction, observation)";

/// What the attempt needs to know about the episode before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeInfo {
    pub kind: EnvKind,
    pub task_type: String,
    pub initial: String,
}

impl EpisodeInfo {
    pub fn from_env(env: &dyn Environment) -> Self {
        Self {
            kind: env.kind(),
            task_type: env.task_type().to_string(),
            initial: env.initial_text().to_string(),
        }
    }
}

pub struct Orchestrator {
    agent: AgentConfig,
    evaluator: Evaluator,
    expander: Expander,
    env: EnvHandle,
    episode: EpisodeInfo,
    namespace: Namespace,
    tree: Option<CodeTree>,
    current: Option<NodeId>,
    turns: usize,
    stop: Option<StopReason>,
    env_success: bool,
}

impl Orchestrator {
    pub fn new(config: &RecodeConfig, episode: EpisodeInfo, env: EnvHandle, expander: Expander) -> Self {
        Self {
            agent: config.agent.clone(),
            evaluator: Evaluator::new(
                config.agent.primitive_name.clone(),
                config.evaluator.max_loop_iterations,
            ),
            expander,
            env,
            episode,
            namespace: Namespace::new(),
            tree: None,
            current: None,
            turns: 0,
            stop: None,
            env_success: false,
        }
    }

    /// `None` until the first turn has run.
    pub fn tree(&self) -> Option<&CodeTree> {
        self.tree.as_ref()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn stop(&self) -> Option<&StopReason> {
        self.stop.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.stop.is_some()
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Run turns until the attempt stops. Failures of the model, the
    /// evaluator task or the environment end the attempt with a stop reason.
    #[instrument(skip_all, fields(env = %self.episode.kind, task_type = %self.episode.task_type))]
    pub async fn run(&mut self) -> StopReason {
        while self.stop.is_none() {
            self.step().await;
        }
        let stop = self.stop.clone().unwrap_or(StopReason::Completed);
        info!(
            stop = stop.label(),
            turns = self.turns,
            cost = self.expander.cost(),
            env_success = self.env_success,
            "attempt finished"
        );
        stop
    }

    /// One turn: expand the current stub or evaluate the current pending node,
    /// then check whether the environment has ended.
    pub async fn step(&mut self) {
        if self.stop.is_some() {
            return;
        }
        if self.turns >= self.agent.max_turns {
            warn!(max_turns = self.agent.max_turns, "turn limit reached");
            self.stop = Some(StopReason::MaxTurns);
            return;
        }
        self.turns += 1;

        let mut tree = match self.tree.take() {
            Some(tree) => tree,
            None => self.seed(),
        };
        self.turn(&mut tree).await;
        self.tree = Some(tree);

        match self.env.status().await {
            Ok(status) => {
                self.env_success = status.success;
                if status.done && self.stop.is_none() {
                    info!(success = status.success, "environment finished the episode");
                    self.stop = Some(StopReason::EnvironmentDone);
                }
            }
            Err(err) => self.abort(format!("query environment status: {err}")),
        }
    }

    fn abort(&mut self, message: String) {
        error!(error = %message, "attempt aborted");
        if self.stop.is_none() {
            self.stop = Some(StopReason::Aborted { message });
        }
    }

    fn seed(&mut self) -> CodeTree {
        let (observation, instruction) =
            parse_raw_observation(&self.episode.initial, self.episode.kind);
        info!(instruction = %instruction, "starting attempt");
        self.namespace.insert("instruction", Value::Str(instruction));
        self.namespace.insert("observation", Value::Str(observation));
        let tree = CodeTree::new(ROOT_CODE);
        self.current = Some(tree.root());
        tree
    }

    async fn turn(&mut self, tree: &mut CodeTree) {
        let Some(id) = self.current else {
            self.stop = Some(StopReason::Completed);
            return;
        };
        match tree.node(id).status {
            NodeStatus::Stub => self.expand(tree, id).await,
            NodeStatus::Pending => self.evaluate(tree, id).await,
            status => {
                debug!(status = status.as_str(), "current node already settled");
                self.advance(tree, id);
            }
        }
    }

    #[instrument(skip_all, fields(node_id = %tree.node(id).uid, depth = tree.node(id).depth))]
    async fn expand(&mut self, tree: &mut CodeTree, id: NodeId) {
        let depth = tree.node(id).depth;
        if depth >= self.agent.max_depth {
            warn!(max_depth = self.agent.max_depth, "depth limit reached");
            self.stop = Some(StopReason::DepthLimit {
                node_id: tree.node(id).uid.clone(),
                depth,
            });
            return;
        }

        let expansion = match self.expander.expand(tree, id, &mut self.namespace).await {
            Ok(Some(expansion)) => expansion,
            Ok(None) => {
                self.stop = Some(StopReason::ExpansionFailed {
                    node_id: tree.node(id).uid.clone(),
                });
                return;
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(error = %message, "expansion failed");
                self.stop = Some(StopReason::ModelFailed {
                    node_id: tree.node(id).uid.clone(),
                    message,
                });
                return;
            }
        };
        if expansion.blocks.is_empty() {
            info!("empty expansion, skipping node");
            tree.mark_skipped(id);
        } else {
            tree.add_children(id, expansion.blocks);
        }
        self.advance(tree, id);
    }

    #[instrument(skip_all, fields(node_id = %tree.node(id).uid, depth = tree.node(id).depth))]
    async fn evaluate(&mut self, tree: &mut CodeTree, id: NodeId) {
        let code = tree.node(id).code.clone();
        let evaluator = self.evaluator.clone();
        let mut primitive = self.env.clone();
        let mut namespace = std::mem::take(&mut self.namespace);
        let joined = tokio::task::spawn_blocking(move || {
            let evaluation = evaluator.evaluate(&code, &mut namespace, &mut primitive);
            (namespace, evaluation)
        })
        .await;
        let (namespace, evaluation) = match joined {
            Ok(done) => done,
            Err(err) => {
                self.abort(format!("join evaluator task: {err}"));
                return;
            }
        };
        self.namespace = namespace;
        tree.record(id, &evaluation);

        match &evaluation.outcome {
            Outcome::Success => self.advance(tree, id),
            Outcome::Stub { name } => debug!(stub = %name, "fragment needs expansion"),
            Outcome::Error { message } => {
                warn!(error = %message, "fragment failed");
                self.stop = Some(StopReason::RuntimeError {
                    node_id: tree.node(id).uid.clone(),
                });
            }
        }
    }

    fn advance(&mut self, tree: &CodeTree, from: NodeId) {
        self.current = tree.next_pending(from);
        if self.current.is_none() {
            debug!("no pending node left");
            self.stop = Some(StopReason::Completed);
        }
    }

    /// Snapshot metadata for this attempt, stamped now.
    pub fn snapshot_meta(&self) -> SnapshotMeta {
        SnapshotMeta {
            env_name: self.episode.kind.to_string(),
            task_type: self.episode.task_type.clone(),
            created_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            max_depth: self.agent.max_depth,
            max_retry: self.agent.max_retry,
            max_rewrite: self.agent.max_rewrite,
        }
    }

    /// Summary of the attempt so far. Before the first turn the tree is the bare root.
    pub fn report(&self) -> AttemptReport {
        let fallback;
        let tree = match &self.tree {
            Some(tree) => tree,
            None => {
                fallback = CodeTree::new(ROOT_CODE);
                &fallback
            }
        };
        AttemptReport {
            cost: self.expander.cost(),
            tree: PlanSnapshot::from_tree(tree, self.snapshot_meta()),
            max_depth: tree.max_depth_reached(),
            stop: self.stop.clone().unwrap_or(StopReason::MaxTurns),
            env_success: self.env_success,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::env::{EnvWorker, ScriptedWorld};
    use crate::test_support::{ScriptedModel, household_resources, household_world};

    fn orchestrator(
        replies: &[&str],
        transitions: &[(&str, &str, bool)],
        config: RecodeConfig,
    ) -> (Orchestrator, Arc<ScriptedModel>) {
        let world = ScriptedWorld::new(household_world("put a mug on the desk", transitions, 20));
        let episode = EpisodeInfo::from_env(&world);
        let (handle, _task) = EnvWorker::spawn(Box::new(world));
        let model = Arc::new(ScriptedModel::new(replies.iter().copied()));
        let expander = Expander::new(
            model.clone(),
            household_resources(),
            config.agent.primitive_name.clone(),
            config.agent.max_rewrite,
        )
        .expect("expander");
        (Orchestrator::new(&config, episode, handle, expander), model)
    }

    /// The first turn seeds both names and finds the root to be a stub.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn first_turn_seeds_namespace_and_root() {
        let (mut orch, _model) = orchestrator(&[], &[], RecodeConfig::default());
        orch.step().await;

        let tree = orch.tree().expect("tree");
        assert_eq!(tree.node(0).code, ROOT_CODE);
        assert_eq!(tree.node(0).status, NodeStatus::Stub);
        assert_eq!(
            orch.namespace().get("instruction"),
            Some(&Value::Str("put a mug on the desk".to_string()))
        );
        assert_eq!(
            orch.namespace().get("observation"),
            Some(&Value::Str("You are in a room.".to_string()))
        );
        assert!(!orch.is_finished());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn depth_limit_stops_before_expanding() {
        let mut config = RecodeConfig::default();
        config.agent.max_depth = 1;
        let (mut orch, model) = orchestrator(
            &["<execute>step_one()</execute>"],
            &[],
            config,
        );
        let stop = orch.run().await;

        let tree = orch.tree().expect("tree");
        let child = tree.node(0).children[0];
        assert_eq!(
            stop,
            StopReason::DepthLimit {
                node_id: tree.node(child).uid.clone(),
                depth: 1
            }
        );
        assert_eq!(model.prompts().len(), 1);
    }

    /// A genuine error ends the attempt and the report names the failing node.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runtime_error_is_reported() {
        let (mut orch, _model) = orchestrator(
            &["<execute>x = 1 / 0\nrun(\"look\")</execute>"],
            &[],
            RecodeConfig::default(),
        );
        let stop = orch.run().await;

        let report = orch.report();
        let StopReason::RuntimeError { node_id } = &stop else {
            panic!("expected runtime error, got {stop:?}");
        };
        let failed = &report.tree.nodes[node_id];
        assert_eq!(failed.status, NodeStatus::Error);
        assert!(failed.error.as_deref().unwrap_or_default().contains("ZeroDivisionError"));
        assert_eq!(report.tree.edges.len(), 2);
        assert_eq!(report.max_depth, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn turn_ceiling_stops_attempt() {
        let mut config = RecodeConfig::default();
        config.agent.max_turns = 1;
        let (mut orch, _model) = orchestrator(&[], &[], config);
        assert_eq!(orch.run().await, StopReason::MaxTurns);
        assert_eq!(orch.turns(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn environment_completion_ends_attempt() {
        let (mut orch, _model) = orchestrator(
            &["<execute>run(\"put mug 1 in/on desk 1\")\nrun(\"look\")</execute>"],
            &[("put mug 1 in/on desk 1", "You put the mug 1 in/on the desk 1.", true)],
            RecodeConfig::default(),
        );
        assert_eq!(orch.run().await, StopReason::EnvironmentDone);
        let report = orch.report();
        assert!(report.env_success);
        assert_eq!(report.tree.meta.env_name, "household");
    }
    /// The model going silent mid-attempt ends it with a report, not an error.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn model_failure_is_a_stop_reason() {
        let (mut orch, model) = orchestrator(
            &["<execute>look_around()\nrun(\"look\")</execute>"],
            &[],
            RecodeConfig::default(),
        );
        let stop = orch.run().await;

        let tree = orch.tree().expect("tree");
        let children = tree.node(tree.root()).children.clone();
        assert_eq!(children.len(), 2);
        let StopReason::ModelFailed { node_id, message } = &stop else {
            panic!("expected model failure, got {stop:?}");
        };
        assert_eq!(node_id, &tree.node(children[0]).uid);
        assert!(message.contains("model returned no reply"));
        assert_eq!(model.prompts().len(), 2);

        let report = orch.report();
        assert_eq!(report.stop, stop);
        assert_eq!(report.tree.nodes.len(), 3);
        assert!(!report.env_success);
    }
}
