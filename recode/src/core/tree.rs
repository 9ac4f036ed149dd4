//! Arena-backed code tree and its traversal order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fragment::{Evaluation, Outcome};

/// Index of a node inside its [`CodeTree`].
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    Pending,
    Stub,
    Completed,
    Error,
    Skipped,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "PENDING",
            NodeStatus::Stub => "STUB",
            NodeStatus::Completed => "COMPLETED",
            NodeStatus::Error => "ERROR",
            NodeStatus::Skipped => "SKIPPED",
        }
    }

    /// Completed, Error and Skipped nodes never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::Error | NodeStatus::Skipped
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeNode {
    /// Stable external id (UUID v4), used in snapshots.
    pub uid: String,
    pub code: String,
    /// Model reasoning from the expansion that produced this node's children.
    pub reasoning: String,
    pub status: NodeStatus,
    pub parent: Option<NodeId>,
    /// Execution order.
    pub children: Vec<NodeId>,
    pub depth: usize,
    pub observations: Vec<String>,
    pub error: Option<String>,
}

impl CodeNode {
    fn pending(code: String, parent: Option<NodeId>, depth: usize) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            code,
            reasoning: String::new(),
            status: NodeStatus::Pending,
            parent,
            children: Vec::new(),
            depth,
            observations: Vec::new(),
            error: None,
        }
    }
}

/// Rooted tree of fragments. Node 0 is always the root.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeTree {
    nodes: Vec<CodeNode>,
}

impl CodeTree {
    pub fn new(root_code: impl Into<String>) -> Self {
        Self {
            nodes: vec![CodeNode::pending(root_code.into(), None, 0)],
        }
    }

    /// Rebuild a tree from a root node; see [`CodeTree::push_node`].
    pub(crate) fn from_root(mut root: CodeNode) -> Self {
        root.parent = None;
        root.children.clear();
        Self { nodes: vec![root] }
    }

    /// Append a fully-formed node under `node.parent`, keeping its uid and status.
    pub(crate) fn push_node(&mut self, mut node: CodeNode) -> NodeId {
        let id = self.nodes.len();
        node.children.clear();
        if let Some(parent) = node.parent {
            self.nodes[parent].children.push(id);
        }
        self.nodes.push(node);
        id
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&CodeNode> {
        self.nodes.get(id)
    }

    /// Panics if `id` was not issued by this tree.
    pub fn node(&self, id: NodeId) -> &CodeNode {
        &self.nodes[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &CodeNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn find_by_uid(&self, uid: &str) -> Option<NodeId> {
        self.nodes.iter().position(|node| node.uid == uid)
    }

    /// Attach pending children to `parent`, in execution order.
    pub fn add_children<I>(&mut self, parent: NodeId, codes: I) -> Vec<NodeId>
    where
        I: IntoIterator<Item = String>,
    {
        let depth = self.nodes[parent].depth + 1;
        codes
            .into_iter()
            .map(|code| self.push_node(CodeNode::pending(code, Some(parent), depth)))
            .collect()
    }

    /// Record one evaluation of a pending node: observations, status, error text.
    pub fn record(&mut self, id: NodeId, evaluation: &Evaluation) {
        let node = &mut self.nodes[id];
        node.observations = evaluation.output.clone();
        match &evaluation.outcome {
            Outcome::Success => {
                node.status = NodeStatus::Completed;
                node.error = None;
            }
            Outcome::Stub { .. } => {
                node.status = NodeStatus::Stub;
                node.error = None;
            }
            Outcome::Error { message } => {
                node.status = NodeStatus::Error;
                node.error = Some(message.clone());
            }
        }
    }

    pub fn set_reasoning(&mut self, id: NodeId, reasoning: impl Into<String>) {
        self.nodes[id].reasoning = reasoning.into();
    }

    pub fn mark_skipped(&mut self, id: NodeId) {
        self.nodes[id].status = NodeStatus::Skipped;
    }

    /// Next node to visit after `from`: its first pending child, otherwise the
    /// first pending sibling after it, climbing towards the root. The scan only
    /// moves forward, so a pending node behind it is never revisited.
    pub fn next_pending(&self, from: NodeId) -> Option<NodeId> {
        if let Some(child) = self.first_pending(&self.nodes[from].children) {
            return Some(child);
        }
        let mut current = from;
        while let Some(parent) = self.nodes[current].parent {
            let siblings = &self.nodes[parent].children;
            let position = siblings.iter().position(|&id| id == current)?;
            if let Some(next) = self.first_pending(&siblings[position + 1..]) {
                return Some(next);
            }
            current = parent;
        }
        None
    }

    fn first_pending(&self, ids: &[NodeId]) -> Option<NodeId> {
        ids.iter()
            .copied()
            .find(|&id| self.nodes[id].status == NodeStatus::Pending)
    }

    pub fn max_depth_reached(&self) -> usize {
        self.nodes.iter().map(|node| node.depth).max().unwrap_or(0)
    }

    /// Ids from the root down to `id`, inclusive.
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Pre-order (depth-first, children in order) node ids.
    pub fn dfs_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Indented outline of the first `max_nodes` nodes in pre-order.
    pub fn summarize(&self, max_nodes: usize) -> String {
        let mut lines = Vec::new();
        for id in self.dfs_order().into_iter().take(max_nodes) {
            let node = &self.nodes[id];
            let indent = "  ".repeat(node.depth);
            let first_line = node.code.lines().next().unwrap_or("").trim();
            let more = if node.code.trim().lines().count() > 1 {
                " ..."
            } else {
                ""
            };
            let mut line = format!("{indent}- [{}] {first_line}{more}", node.status.as_str());
            if let Some(error) = &node.error {
                line.push_str(&format!("  !! {error}"));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success() -> Evaluation {
        Evaluation {
            outcome: Outcome::Success,
            output: vec!["ok".to_string()],
            actions: Vec::new(),
        }
    }

    fn stub() -> Evaluation {
        Evaluation {
            outcome: Outcome::Stub {
                name: "f".to_string(),
            },
            output: Vec::new(),
            actions: Vec::new(),
        }
    }

    #[test]
    fn children_get_parent_depth_plus_one() {
        let mut tree = CodeTree::new("solve(a, b)");
        let kids = tree.add_children(tree.root(), vec!["x = 1".to_string(), "g(x)".to_string()]);
        let grandkids = tree.add_children(kids[1], vec!["run('look')".to_string()]);
        assert_eq!(tree.node(kids[0]).depth, 1);
        assert_eq!(tree.node(grandkids[0]).depth, 2);
        assert_eq!(tree.node(grandkids[0]).parent, Some(kids[1]));
        assert_eq!(tree.max_depth_reached(), 2);
        assert_eq!(tree.path_to(grandkids[0]), vec![0, kids[1], grandkids[0]]);
        assert_ne!(tree.node(kids[0]).uid, tree.node(kids[1]).uid);
    }

    /// Children are visited before the parent's later siblings, then the scan
    /// climbs back up.
    #[test]
    fn next_pending_visits_in_depth_first_order() {
        let mut tree = CodeTree::new("solve()");
        tree.record(0, &stub());
        let top = tree.add_children(0, vec!["a()".to_string(), "b = 1".to_string()]);
        assert_eq!(tree.next_pending(0), Some(top[0]));

        tree.record(top[0], &stub());
        let inner = tree.add_children(top[0], vec!["c = 2".to_string()]);
        assert_eq!(tree.next_pending(top[0]), Some(inner[0]));

        tree.record(inner[0], &success());
        assert_eq!(tree.next_pending(inner[0]), Some(top[1]));

        tree.record(top[1], &success());
        assert_eq!(tree.next_pending(top[1]), None);
    }

    #[test]
    fn next_pending_never_moves_backwards() {
        let mut tree = CodeTree::new("solve()");
        let kids = tree.add_children(0, vec!["a = 1".to_string(), "b = 2".to_string()]);
        // Scanning from the second child skips the still-pending first one.
        tree.record(kids[1], &success());
        assert_eq!(tree.next_pending(kids[1]), None);
    }

    #[test]
    fn record_sets_error_text() {
        let mut tree = CodeTree::new("x = y");
        tree.record(
            0,
            &Evaluation {
                outcome: Outcome::Error {
                    message: "NameError: name 'y' is not defined".to_string(),
                },
                output: Vec::new(),
                actions: Vec::new(),
            },
        );
        assert_eq!(tree.node(0).status, NodeStatus::Error);
        assert_eq!(
            tree.node(0).error.as_deref(),
            Some("NameError: name 'y' is not defined")
        );
    }

    #[test]
    fn summarize_truncates_and_indents() {
        let mut tree = CodeTree::new("solve(a)");
        tree.record(0, &stub());
        tree.add_children(0, vec!["x = 1".to_string(), "for i in x:\n    pass".to_string()]);
        let outline = tree.summarize(2);
        assert_eq!(outline, "- [STUB] solve(a)\n  - [PENDING] x = 1");
        assert!(tree.summarize(10).ends_with("- [PENDING] for i in x: ..."));
    }

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_string(&NodeStatus::Completed).expect("serialize");
        assert_eq!(json, "\"COMPLETED\"");
        assert!(NodeStatus::Skipped.is_terminal());
        assert!(!NodeStatus::Stub.is_terminal());
    }
}
