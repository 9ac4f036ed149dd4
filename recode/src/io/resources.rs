//! Per-environment prompt resources: action descriptions and few-shot examples.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::env::EnvKind;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvResources {
    pub actions: String,
    /// Empty when no few-shot file exists.
    pub fewshots: String,
}

/// Load `<dir>/<env>/actions.txt` and the best few-shot file:
/// `<dir>/<env>/fewshots/<task_type>.txt`, falling back to `base.txt`.
pub fn load_resources(dir: &Path, kind: EnvKind, task_type: &str) -> Result<EnvResources> {
    let env_dir = dir.join(kind.as_str());
    let actions_path = env_dir.join("actions.txt");
    let actions = fs::read_to_string(&actions_path)
        .with_context(|| format!("read actions {}", actions_path.display()))?;

    let fewshots = match fewshot_path(&env_dir, task_type) {
        Some(path) => {
            debug!(path = %path.display(), "loading few-shot examples");
            fs::read_to_string(&path)
                .with_context(|| format!("read few-shot examples {}", path.display()))?
        }
        None => {
            warn!(env = %kind, task_type, "no few-shot examples found");
            String::new()
        }
    };
    Ok(EnvResources { actions, fewshots })
}

fn fewshot_path(env_dir: &Path, task_type: &str) -> Option<PathBuf> {
    let dir = env_dir.join("fewshots");
    let task_type = task_type.trim().to_lowercase();
    let mut candidates = Vec::new();
    if !task_type.is_empty() {
        candidates.push(dir.join(format!("{task_type}.txt")));
    }
    candidates.push(dir.join("base.txt"));
    candidates.into_iter().find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, contents).expect("write");
    }

    #[test]
    fn task_specific_examples_win_over_base() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(&temp.path().join("household/actions.txt"), "go to {recep}");
        write(&temp.path().join("household/fewshots/base.txt"), "base");
        write(&temp.path().join("household/fewshots/clean.txt"), "clean");

        let res = load_resources(temp.path(), EnvKind::Household, "Clean").expect("load");
        assert_eq!(res.actions, "go to {recep}");
        assert_eq!(res.fewshots, "clean");

        let res = load_resources(temp.path(), EnvKind::Household, "heat").expect("load");
        assert_eq!(res.fewshots, "base");
    }

    #[test]
    fn missing_examples_are_empty_but_actions_are_required() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(&temp.path().join("shop/actions.txt"), "search[query]");
        let res = load_resources(temp.path(), EnvKind::Shop, "").expect("load");
        assert!(res.fewshots.is_empty());

        let err = load_resources(temp.path(), EnvKind::Science, "").expect_err("missing");
        assert!(err.to_string().contains("read actions"));
    }
}
