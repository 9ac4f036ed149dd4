//! Structural invariants of a code tree, checked after load and in tests.

use std::collections::HashSet;

use crate::core::tree::{CodeTree, NodeId, NodeStatus};

/// Check tree invariants, returning one message per violation:
/// - unique uids, every node reachable from the root exactly once
/// - parent links agree with child lists
/// - `depth == parent.depth + 1`, root depth 0
/// - error text present exactly on `ERROR` nodes
/// - only `STUB` nodes have children
pub fn validate_invariants(tree: &CodeTree) -> Vec<String> {
    let mut errors = Vec::new();
    if tree.is_empty() {
        errors.push("tree has no root".to_string());
        return errors;
    }

    let mut uids = HashSet::new();
    for (id, node) in tree.iter() {
        if !uids.insert(node.uid.as_str()) {
            errors.push(format!("duplicate id '{}'", node.uid));
        }
        let path = render_path(tree, id);
        match node.parent {
            None if id != tree.root() => {
                errors.push(format!("{path}: non-root node has no parent"));
            }
            None => {
                if node.depth != 0 {
                    errors.push(format!("{path}: root depth must be 0, got {}", node.depth));
                }
            }
            Some(parent) => match tree.get(parent) {
                None => errors.push(format!("{path}: parent {parent} does not exist")),
                Some(parent_node) => {
                    let listed = parent_node.children.iter().filter(|&&c| c == id).count();
                    if listed != 1 {
                        errors.push(format!(
                            "{path}: listed {listed} times in its parent's children"
                        ));
                    }
                    if node.depth != parent_node.depth + 1 {
                        errors.push(format!(
                            "{path}: depth {} does not follow parent depth {}",
                            node.depth, parent_node.depth
                        ));
                    }
                }
            },
        }
        for &child in &node.children {
            if tree.get(child).and_then(|c| c.parent) != Some(id) {
                errors.push(format!("{path}: child {child} does not point back"));
            }
        }
        if (node.status == NodeStatus::Error) != node.error.is_some() {
            errors.push(format!(
                "{path}: error text must be set exactly when status is ERROR"
            ));
        }
        if !node.children.is_empty() && node.status != NodeStatus::Stub {
            errors.push(format!(
                "{path}: only STUB nodes may have children, found {}",
                node.status.as_str()
            ));
        }
    }

    let reachable = tree.dfs_order();
    if reachable.len() != tree.len() {
        errors.push(format!(
            "{} of {} nodes reachable from the root",
            reachable.len(),
            tree.len()
        ));
    }
    errors
}

/// Error paths are `/`-separated uid prefixes from the root.
fn render_path(tree: &CodeTree, id: NodeId) -> String {
    tree.path_to(id)
        .into_iter()
        .map(|step| short_uid(&tree.node(step).uid))
        .collect::<Vec<_>>()
        .join("/")
}

fn short_uid(uid: &str) -> String {
    uid.chars().take(8).collect()
}
