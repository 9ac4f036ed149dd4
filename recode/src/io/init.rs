//! Project scaffolding for `recode init`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{DEFAULT_CONFIG_PATH, RecodeConfig, write_config};

const HOUSEHOLD_ACTIONS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/resources/household/actions.txt"
));
const HOUSEHOLD_FEWSHOTS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/resources/household/fewshots/base.txt"
));
const SAMPLE_TASK: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tasks/put_mug.toml"));

/// Canonical paths of a scaffolded project.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub resources_dir: PathBuf,
    pub household_actions_path: PathBuf,
    pub household_fewshots_path: PathBuf,
    pub sample_task_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let resources_dir = root.join("resources");
        let household = resources_dir.join("household");
        Self {
            config_path: root.join(DEFAULT_CONFIG_PATH),
            household_actions_path: household.join("actions.txt"),
            household_fewshots_path: household.join("fewshots").join("base.txt"),
            sample_task_path: root.join("tasks").join("put_mug.toml"),
            resources_dir,
            root,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing files.
    pub force: bool,
}

/// Write a default config, sample household resources and a sample task.
///
/// Fails if the config already exists unless `options.force` is set.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<ProjectPaths> {
    let paths = ProjectPaths::new(root);
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "recode init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }
    write_config(&paths.config_path, &RecodeConfig::default())?;
    write_file(&paths.household_actions_path, HOUSEHOLD_ACTIONS)?;
    write_file(&paths.household_fewshots_path, HOUSEHOLD_FEWSHOTS)?;
    write_file(&paths.sample_task_path, SAMPLE_TASK)?;
    Ok(paths)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvKind, WorldSpec};
    use crate::io::config::load_config;
    use crate::io::resources::load_resources;

    /// A scaffolded project loads cleanly: config, resources and the sample task.
    #[test]
    fn init_creates_loadable_project() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");

        assert_eq!(load_config(&paths.config_path).expect("config"), RecodeConfig::default());
        let resources =
            load_resources(&paths.resources_dir, EnvKind::Household, "put").expect("resources");
        assert!(resources.actions.contains("go to {recep}"));
        assert!(resources.fewshots.contains("<execute>"));
        let task = WorldSpec::load(&paths.sample_task_path).expect("task");
        assert_eq!(task.name, EnvKind::Household);
    }

    #[test]
    fn init_without_force_refuses_existing_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_project(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_project(temp.path(), &InitOptions { force: false }).expect_err("exists");
        assert!(err.to_string().contains("already exists"));
        init_project(temp.path(), &InitOptions { force: true }).expect("forced");
    }
}
