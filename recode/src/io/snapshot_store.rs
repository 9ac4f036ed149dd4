//! Snapshot and report load/save helpers with schema + invariant validation.

use std::path::Path;
use std::fs;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::core::invariants::validate_invariants;
use crate::core::snapshot::PlanSnapshot;
use crate::core::tree::CodeTree;
use crate::core::types::AttemptReport;
use crate::io::config::write_atomic;

const SNAPSHOT_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/plan_snapshot.v1.schema.json"
));

/// Load a snapshot, validate it against the schema, and rebuild its tree
/// (which must satisfy the tree invariants).
pub fn load_snapshot(path: &Path) -> Result<(PlanSnapshot, CodeTree)> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse snapshot {}", path.display()))?;
    validate_schema(&value)?;
    let snapshot: PlanSnapshot = serde_json::from_value(value)
        .with_context(|| format!("deserialize snapshot {}", path.display()))?;
    let tree = snapshot
        .to_tree()
        .with_context(|| format!("rebuild tree {}", path.display()))?;
    validate_tree_invariants(&tree)?;
    Ok((snapshot, tree))
}

pub fn write_snapshot(path: &Path, snapshot: &PlanSnapshot) -> Result<()> {
    write_json(path, snapshot)
}

pub fn write_report(path: &Path, report: &AttemptReport) -> Result<()> {
    write_json(path, report)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn validate_schema(snapshot: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(SNAPSHOT_SCHEMA).context("parse snapshot schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(snapshot) {
        let messages = compiled
            .iter_errors(snapshot)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "snapshot schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn validate_tree_invariants(tree: &CodeTree) -> Result<()> {
    let errors = validate_invariants(tree);
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!("tree invariants failed: {}", errors.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::SnapshotMeta;
    use crate::core::tree::NodeStatus;
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

    fn tree() -> CodeTree {
        let mut tree = CodeTree::new("solve(instruction, observation)");
        tree.record(
            0,
            &Evaluation {
                outcome: Outcome::Stub {
                    name: "solve".to_string(),
                },
                output: Vec::new(),
                actions: Vec::new(),
            },
        );
        tree.add_children(0, vec!["run('look')".to_string()]);
        tree
    }

    /// Writes a snapshot, loads it back through the schema, and checks the tree.
    #[test]
    fn write_and_load_snapshot_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out").join("snapshot.json");
        let snapshot = PlanSnapshot::from_tree(&tree(), meta());
        write_snapshot(&path, &snapshot).expect("write");

        let (loaded, rebuilt) = load_snapshot(&path).expect("load");
        assert_eq!(loaded, snapshot);
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt.node(1).status, NodeStatus::Pending);
    }

    #[test]
    fn schema_rejects_unknown_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("snapshot.json");
        let snapshot = PlanSnapshot::from_tree(&tree(), meta());
        let text = serde_json::to_string(&snapshot)
            .expect("serialize")
            .replace("\"PENDING\"", "\"WAITING\"");
        fs::write(&path, text).expect("write");

        let err = load_snapshot(&path).expect_err("invalid");
        assert!(err.to_string().contains("schema validation failed"));
    }

    /// Schema-valid files can still break tree invariants.
    #[test]
    fn invariant_violations_are_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("snapshot.json");
        let mut snapshot = PlanSnapshot::from_tree(&tree(), meta());
        let root = snapshot.root_id.clone();
        if let Some(node) = snapshot.nodes.get_mut(&root) {
            node.status = NodeStatus::Completed;
        }
        write_snapshot(&path, &snapshot).expect("write");

        let err = load_snapshot(&path).expect_err("invariants");
        assert!(err.to_string().contains("tree invariants failed"));
    }
}
