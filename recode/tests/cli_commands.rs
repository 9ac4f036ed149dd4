//! CLI tests for the offline commands.
//!
//! Spawns the recode binary and checks exit codes and output for `init`,
//! `split`, `validate` and `show`.

use std::fs;
use std::process::Command;

use recode::core::snapshot::{PlanSnapshot, SnapshotMeta};
use recode::core::tree::CodeTree;
use recode::exit_codes;
use recode::io::init::ProjectPaths;
use recode::io::snapshot_store::write_snapshot;
use recode::test_support::{stub, success};

fn recode() -> Command {
    Command::new(env!("CARGO_BIN_EXE_recode"))
}

fn snapshot() -> PlanSnapshot {
    let mut tree = CodeTree::new("solve(instruction, observation)");
    tree.record(0, &stub("solve"));
    let kids = tree.add_children(0, vec!["run(\"look\")".to_string()]);
    tree.record(kids[0], &success(&["You see a desk 1."]));
    PlanSnapshot::from_tree(
        &tree,
        SnapshotMeta {
            env_name: "household".to_string(),
            task_type: "put".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            max_depth: 10,
            max_retry: 5,
            max_rewrite: 5,
        },
    )
}

#[test]
fn init_twice_needs_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = recode()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("recode init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    let paths = ProjectPaths::new(temp.path());
    assert!(paths.config_path.exists());
    assert!(paths.household_actions_path.exists());

    let status = recode()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("recode init again");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    let status = recode()
        .current_dir(temp.path())
        .args(["init", "--force"])
        .status()
        .expect("recode init --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn split_prints_blocks_or_rejects_definitions() {
    let temp = tempfile::tempdir().expect("tempdir");
    let good = temp.path().join("good.py");
    fs::write(&good, "x = 1\nif x:\n    run(\"look\")\n").expect("write");
    let output = recode().arg("split").arg(&good).output().expect("recode split");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--- block 1\nif x:\n    run(\"look\")"));

    let bad = temp.path().join("bad.py");
    fs::write(&bad, "def helper():\n    pass\n").expect("write");
    let output = recode().arg("split").arg(&bad).output().expect("recode split");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not allowed"));
}

#[test]
fn validate_and_show_read_snapshots() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("snapshot.json");
    write_snapshot(&path, &snapshot()).expect("write snapshot");

    let output = recode().arg("validate").arg(&path).output().expect("recode validate");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("ok: 2 nodes"));

    let output = recode().arg("show").arg(&path).output().expect("recode show");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[STUB] solve(instruction, observation)"));
    assert!(stdout.contains("[COMPLETED] run(\"look\")"));

    fs::write(&path, "{\"version\": \"other\"}").expect("corrupt");
    let output = recode().arg("validate").arg(&path).output().expect("recode validate");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}
