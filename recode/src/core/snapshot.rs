//! Exportable attempt snapshot (`recode.plan.v1`).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::tree::{CodeNode, CodeTree, NodeId, NodeStatus};

pub const SNAPSHOT_VERSION: &str = "recode.plan.v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub env_name: String,
    pub task_type: String,
    /// RFC 3339, UTC.
    pub created_at: String,
    pub max_depth: usize,
    pub max_retry: usize,
    pub max_rewrite: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub code: String,
    pub thought: String,
    pub status: NodeStatus,
    pub depth: usize,
    pub observations: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub version: String,
    pub meta: SnapshotMeta,
    pub root_id: String,
    pub nodes: BTreeMap<String, SnapshotNode>,
    /// `[parent, child]` pairs in depth-first order.
    pub edges: Vec<[String; 2]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot version '{0}'")]
    Version(String),
    #[error("node '{0}' is referenced but not defined")]
    MissingNode(String),
    #[error("edge to '{child}' appears before its parent '{parent}'")]
    EdgeOrder { parent: String, child: String },
    #[error("node '{0}' has more than one parent")]
    DuplicateChild(String),
    #[error("nodes not reachable from the root: {}", .0.join(", "))]
    Unreachable(Vec<String>),
}

impl PlanSnapshot {
    pub fn from_tree(tree: &CodeTree, meta: SnapshotMeta) -> Self {
        let mut nodes = BTreeMap::new();
        let mut edges = Vec::new();
        for id in tree.dfs_order() {
            let node = tree.node(id);
            nodes.insert(
                node.uid.clone(),
                SnapshotNode {
                    code: node.code.clone(),
                    thought: node.reasoning.clone(),
                    status: node.status,
                    depth: node.depth,
                    observations: node.observations.clone(),
                    error: node.error.clone(),
                },
            );
            for &child in &node.children {
                edges.push([node.uid.clone(), tree.node(child).uid.clone()]);
            }
        }
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            meta,
            root_id: tree.node(tree.root()).uid.clone(),
            nodes,
            edges,
        }
    }

    /// Rebuild the tree with the same ids, adjacency and statuses.
    pub fn to_tree(&self) -> Result<CodeTree, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(self.version.clone()));
        }
        let mut tree = CodeTree::from_root(self.code_node(&self.root_id, None)?);
        let mut ids: HashMap<&str, NodeId> = HashMap::new();
        ids.insert(self.root_id.as_str(), tree.root());
        for [parent, child] in &self.edges {
            let parent_id = *ids.get(parent.as_str()).ok_or_else(|| SnapshotError::EdgeOrder {
                parent: parent.clone(),
                child: child.clone(),
            })?;
            if ids.contains_key(child.as_str()) {
                return Err(SnapshotError::DuplicateChild(child.clone()));
            }
            let id = tree.push_node(self.code_node(child, Some(parent_id))?);
            ids.insert(child.as_str(), id);
        }
        if ids.len() != self.nodes.len() {
            let orphans = self
                .nodes
                .keys()
                .filter(|uid| !ids.contains_key(uid.as_str()))
                .cloned()
                .collect();
            return Err(SnapshotError::Unreachable(orphans));
        }
        Ok(tree)
    }

    fn code_node(&self, uid: &str, parent: Option<NodeId>) -> Result<CodeNode, SnapshotError> {
        let node = self
            .nodes
            .get(uid)
            .ok_or_else(|| SnapshotError::MissingNode(uid.to_string()))?;
        Ok(CodeNode {
            uid: uid.to_string(),
            code: node.code.clone(),
            reasoning: node.thought.clone(),
            status: node.status,
            parent,
            children: Vec::new(),
            depth: node.depth,
            observations: node.observations.clone(),
            error: node.error.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::invariants::validate_invariants;
    use crate::fragment::{Evaluation, Outcome};

    fn meta() -> SnapshotMeta {
        SnapshotMeta {
            env_name: "household".to_string(),
            task_type: "put".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            max_depth: 10,
            max_retry: 5,
            max_rewrite: 5,
        }
    }

    fn evaluation(outcome: Outcome) -> Evaluation {
        Evaluation {
            outcome,
            output: vec!["seen".to_string()],
            actions: Vec::new(),
        }
    }

    fn sample_tree() -> CodeTree {
        let mut tree = CodeTree::new("solve(instruction, observation)");
        tree.record(0, &evaluation(Outcome::Stub { name: "solve".to_string() }));
        tree.set_reasoning(0, "split it up");
        let kids = tree.add_children(0, vec!["a = 1".to_string(), "go(a)".to_string(), "b = 2".to_string()]);
        tree.record(kids[0], &evaluation(Outcome::Success));
        tree.record(kids[1], &evaluation(Outcome::Stub { name: "go".to_string() }));
        let inner = tree.add_children(kids[1], vec!["run('go')".to_string()]);
        tree.record(
            inner[0],
            &evaluation(Outcome::Error {
                message: "StepLimitError: Step limit of 1 exceeded.".to_string(),
            }),
        );
        tree
    }

    /// Export then rebuild keeps ids, child order, statuses and node data.
    #[test]
    fn snapshot_rebuilds_identical_tree() {
        let tree = sample_tree();
        let snapshot = PlanSnapshot::from_tree(&tree, meta());
        assert_eq!(snapshot.edges.len(), 4);
        assert_eq!(snapshot.edges[3][0], tree.node(2).uid);

        let json = serde_json::to_string_pretty(&snapshot).expect("serialize");
        let loaded: PlanSnapshot = serde_json::from_str(&json).expect("deserialize");
        let rebuilt = loaded.to_tree().expect("rebuild");

        assert!(validate_invariants(&rebuilt).is_empty());
        assert_eq!(rebuilt.len(), tree.len());
        for (original, copy) in tree.dfs_order().into_iter().zip(rebuilt.dfs_order()) {
            let (a, b) = (tree.node(original), rebuilt.node(copy));
            assert_eq!(a.uid, b.uid);
            assert_eq!(a.status, b.status);
            assert_eq!(a.code, b.code);
            assert_eq!(a.error, b.error);
            assert_eq!(a.children.len(), b.children.len());
        }
        assert_eq!(rebuilt.node(0).reasoning, "split it up");
    }

    #[test]
    fn status_is_uppercase_in_json() {
        let snapshot = PlanSnapshot::from_tree(&sample_tree(), meta());
        let json = serde_json::to_value(&snapshot).expect("serialize");
        let root = &json["nodes"][snapshot.root_id.as_str()];
        assert_eq!(root["status"], "STUB");
        assert_eq!(json["version"], SNAPSHOT_VERSION);
    }

    #[test]
    fn rejects_unknown_version_and_missing_nodes() {
        let mut snapshot = PlanSnapshot::from_tree(&sample_tree(), meta());
        snapshot.version = "recode.plan.v0".to_string();
        assert!(matches!(snapshot.to_tree(), Err(SnapshotError::Version(_))));

        let mut snapshot = PlanSnapshot::from_tree(&sample_tree(), meta());
        snapshot.edges.push([snapshot.root_id.clone(), "ghost".to_string()]);
        assert_eq!(
            snapshot.to_tree(),
            Err(SnapshotError::MissingNode("ghost".to_string()))
        );
    }

    #[test]
    fn rejects_orphan_and_doubly_parented_nodes() {
        let mut snapshot = PlanSnapshot::from_tree(&sample_tree(), meta());
        let template = snapshot.nodes[&snapshot.root_id].clone();
        snapshot.nodes.insert("stray".to_string(), template);
        assert_eq!(
            snapshot.to_tree(),
            Err(SnapshotError::Unreachable(vec!["stray".to_string()]))
        );

        let mut snapshot = PlanSnapshot::from_tree(&sample_tree(), meta());
        let [_, first_child] = snapshot.edges[0].clone();
        snapshot.edges.push([snapshot.root_id.clone(), first_child.clone()]);
        assert_eq!(
            snapshot.to_tree(),
            Err(SnapshotError::DuplicateChild(first_child))
        );
    }
}
