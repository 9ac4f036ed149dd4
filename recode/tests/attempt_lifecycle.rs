//! Full attempts against scripted worlds and a scripted model.
//!
//! Each test drives `Orchestrator::run` end to end: fragments run on a blocking
//! thread, reach the world through the env worker, and stubs are expanded from
//! canned replies.

use std::sync::Arc;

use recode::agents::expander::{DISALLOWED_HINT, GENERAL_HINT};
use recode::agents::{EpisodeInfo, Expander, Orchestrator};
use recode::core::invariants::validate_invariants;
use recode::core::tree::NodeStatus;
use recode::core::types::StopReason;
use recode::env::{EnvWorker, ScriptedWorld};
use recode::fragment::Value;
use recode::io::config::RecodeConfig;
use recode::test_support::{ScriptedModel, household_resources, household_world};

const TASK: &str = "find a mug and put it on the desk";

fn transitions() -> Vec<(&'static str, &'static str, bool)> {
    vec![
        ("go to shelf 1", "On the shelf 1, you see a mug 1.", false),
        ("take mug 1 from shelf 1", "You pick up the mug 1 from the shelf 1.", false),
        ("put mug 1 in/on desk 1", "You put the mug 1 in/on the desk 1.", true),
    ]
}

fn attempt(replies: &[&str], config: &RecodeConfig) -> (Orchestrator, Arc<ScriptedModel>) {
    let world = ScriptedWorld::new(household_world(TASK, &transitions(), 30));
    let episode = EpisodeInfo::from_env(&world);
    let (env, _worker) = EnvWorker::spawn(Box::new(world));
    let model = Arc::new(ScriptedModel::new(replies.iter().copied()));
    let expander = Expander::new(
        model.clone(),
        household_resources(),
        config.agent.primitive_name.clone(),
        config.agent.max_rewrite,
    )
    .expect("expander");
    (Orchestrator::new(config, episode, env, expander), model)
}

/// Root expands into two primitive calls; both complete and the task succeeds.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn happy_path_completes_every_leaf() {
    let (mut orch, model) = attempt(
        &["<think>take it, then put it</think><execute>\nobs = run(\"take mug 1 from shelf 1\")\nrun(\"put mug 1 in/on desk 1\")\n</execute>"],
        &RecodeConfig::default(),
    );
    let stop = orch.run().await;
    assert_eq!(stop, StopReason::Completed);

    let tree = orch.tree().expect("tree");
    let root = tree.node(tree.root());
    assert_eq!(root.status, NodeStatus::Stub);
    assert_eq!(root.reasoning, "take it, then put it");
    let codes: Vec<&str> = root.children.iter().map(|&id| tree.node(id).code.as_str()).collect();
    assert_eq!(
        codes,
        vec!["obs = run(\"take mug 1 from shelf 1\")", "run(\"put mug 1 in/on desk 1\")"]
    );
    for &child in &root.children {
        assert_eq!(tree.node(child).status, NodeStatus::Completed);
    }
    assert!(tree.iter().all(|(_, node)| node.status != NodeStatus::Error));
    assert_eq!(
        orch.namespace().get("obs"),
        Some(&Value::Str("You pick up the mug 1 from the shelf 1.".to_string()))
    );
    assert!(model.prompts()[0].contains("solve(instruction, observation)"));
    assert!(model.prompts()[0].contains(&format!("- instruction (str): {TASK}")));

    let report = orch.report();
    assert!(report.env_success);
    assert_eq!(report.max_depth, 1);
    assert!(validate_invariants(tree).is_empty());
}

/// Variables bound deep in one branch are visible when a later branch expands.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn namespace_flows_across_branches() {
    let (mut orch, model) = attempt(
        &[
            "<execute>mug = find(\"mug\")\nput(mug, \"desk\")</execute>",
            "<execute>run(\"go to shelf 1\")\nrun(\"take mug 1 from shelf 1\")\nmug = \"mug 1\"</execute>",
            "<execute>run(f\"put {mug} in/on desk 1\")</execute>",
        ],
        &RecodeConfig::default(),
    );
    let stop = orch.run().await;
    assert_eq!(stop, StopReason::Completed);

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains("mug = find(\"mug\")"));
    assert!(prompts[2].contains("- mug (str): mug 1"));

    let tree = orch.tree().expect("tree");
    let order: Vec<(usize, NodeStatus)> = tree
        .dfs_order()
        .into_iter()
        .map(|id| (tree.node(id).depth, tree.node(id).status))
        .collect();
    assert_eq!(
        order,
        vec![
            (0, NodeStatus::Stub),
            (1, NodeStatus::Stub),
            (2, NodeStatus::Completed),
            (2, NodeStatus::Completed),
            (2, NodeStatus::Completed),
            (1, NodeStatus::Stub),
            (2, NodeStatus::Completed),
        ]
    );
    assert!(orch.report().env_success);
}

/// A reply without an execute section skips the stub and moves on.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_execute_section_skips_node() {
    let (mut orch, _model) = attempt(
        &[
            "<execute>look_around()\nrun(\"put mug 1 in/on desk 1\")</execute>",
            "<think>nothing to look at</think>",
        ],
        &RecodeConfig::default(),
    );
    let stop = orch.run().await;
    assert_eq!(stop, StopReason::Completed);

    let tree = orch.tree().expect("tree");
    let children = &tree.node(tree.root()).children;
    let skipped = tree.node(children[0]);
    assert_eq!(skipped.status, NodeStatus::Skipped);
    assert!(skipped.children.is_empty());
    assert_eq!(skipped.reasoning, "nothing to look at");
    assert_eq!(tree.node(children[1]).status, NodeStatus::Completed);
}

/// Budget 2: three replies with definitions, the last prompt carries the hints,
/// then the attempt is abandoned without children.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exhausted_rewrites_abandon_attempt() {
    let mut config = RecodeConfig::default();
    config.agent.max_rewrite = 2;
    let definition = "<execute>def solve(instruction, observation):\n    run(\"look\")</execute>";
    let (mut orch, model) = attempt(&[definition, definition, definition], &config);
    let stop = orch.run().await;

    let tree = orch.tree().expect("tree");
    let root = tree.node(tree.root());
    assert_eq!(
        stop,
        StopReason::ExpansionFailed {
            node_id: root.uid.clone()
        }
    );
    assert!(root.children.is_empty());

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].contains(GENERAL_HINT));
    assert!(prompts[2].contains(GENERAL_HINT));
    assert!(prompts[2].contains(DISALLOWED_HINT));
    assert!(!orch.report().env_success);
}

/// The exported snapshot rebuilds the same tree.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn report_snapshot_round_trips() {
    let (mut orch, _model) = attempt(
        &[
            "<execute>look_around()\nrun(\"put mug 1 in/on desk 1\")</execute>",
            "<execute></execute>",
        ],
        &RecodeConfig::default(),
    );
    orch.run().await;

    let report = orch.report();
    let rebuilt = report.tree.to_tree().expect("rebuild");
    let tree = orch.tree().expect("tree");
    assert_eq!(rebuilt.len(), tree.len());
    for (id, node) in tree.iter() {
        let other = rebuilt.node(rebuilt.find_by_uid(&node.uid).expect("uid"));
        assert_eq!(other.status, node.status);
        let kids: Vec<&str> = node.children.iter().map(|&c| tree.node(c).uid.as_str()).collect();
        let other_kids: Vec<&str> = other
            .children
            .iter()
            .map(|&c| rebuilt.node(c).uid.as_str())
            .collect();
        assert_eq!(kids, other_kids, "children of node {id}");
    }
    assert_eq!(report.tree.meta.max_rewrite, 5);
}

/// A fragment that uses up the world's step budget fails with the step-limit error.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn step_limit_is_a_runtime_error() {
    let world = ScriptedWorld::new(household_world(TASK, &[], 2));
    let episode = EpisodeInfo::from_env(&world);
    let (env, _worker) = EnvWorker::spawn(Box::new(world));
    let model = Arc::new(ScriptedModel::new([
        "<execute>for _ in range(3):\n    run(\"look\")</execute>",
    ]));
    let config = RecodeConfig::default();
    let expander = Expander::new(model, household_resources(), "run", 5).expect("expander");
    let mut orch = Orchestrator::new(&config, episode, env, expander);

    let stop = orch.run().await;
    let StopReason::RuntimeError { node_id } = stop else {
        panic!("expected runtime error, got {stop:?}");
    };
    let report = orch.report();
    let node = &report.tree.nodes[&node_id];
    assert_eq!(
        node.error.as_deref(),
        Some("StepLimitError: Step limit of 2 exceeded.")
    );
    assert_eq!(node.observations, vec!["Nothing happens.", "Nothing happens."]);
}
