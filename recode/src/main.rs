//! Recursive code-expansion agent CLI.
//!
//! `recode run` drives one attempt against a scripted text world and writes
//! `report.json` and `snapshot.json`; the other commands scaffold a project and
//! inspect snapshots or model output offline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use recode::agents::{EpisodeInfo, Expander, Orchestrator};
use recode::core::split::{split, validate};
use recode::core::types::AttemptReport;
use recode::env::{EnvWorker, ScriptedWorld, WorldSpec};
use recode::exit_codes;
use recode::io::config::{DEFAULT_CONFIG_PATH, load_config};
use recode::io::init::{InitOptions, init_project};
use recode::io::resources::load_resources;
use recode::io::snapshot_store::{load_snapshot, write_report, write_snapshot};
use recode::logging;
use recode::model::{OpenAiClient, Pricing};

const SHOW_MAX_NODES: usize = 200;

#[derive(Parser)]
#[command(
    name = "recode",
    version,
    about = "Recursive code-expansion agent for text environments"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `recode.toml`, household resources and a sample task.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run one attempt against a scripted world.
    Run {
        /// Task file describing the world.
        #[arg(long)]
        task: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Output directory; defaults to `runs/<uuid>`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a snapshot against the schema and tree invariants.
    Validate { snapshot: PathBuf },
    /// Print a snapshot as an indented outline.
    Show { snapshot: PathBuf },
    /// Split a code file into blocks and validate them.
    Split { file: PathBuf },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Run { task, config, out } => cmd_run(&task, &config, out),
        Command::Validate { snapshot } => cmd_validate(&snapshot),
        Command::Show { snapshot } => cmd_show(&snapshot),
        Command::Split { file } => cmd_split(&file),
    }
}

fn cmd_init(force: bool) -> Result<i32> {
    let paths = init_project(Path::new("."), &InitOptions { force })?;
    println!("wrote {}", paths.config_path.display());
    println!("wrote {}", paths.sample_task_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(task: &Path, config_path: &Path, out: Option<PathBuf>) -> Result<i32> {
    let config = load_config(config_path)?;
    let spec = WorldSpec::load(task)?;
    let resources = load_resources(&config.resources.dir, spec.name, &spec.task_type)?;
    let model = OpenAiClient::from_config(&config.model, Pricing::new(config.prices.clone()))
        .context("create model client")?;
    let out = out.unwrap_or_else(|| PathBuf::from("runs").join(uuid::Uuid::new_v4().to_string()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    let report: AttemptReport = runtime.block_on(async {
        let world = ScriptedWorld::new(spec);
        let episode = EpisodeInfo::from_env(&world);
        let (env, _worker) = EnvWorker::spawn(Box::new(world));
        let expander = Expander::new(
            Arc::new(model),
            resources,
            config.agent.primitive_name.clone(),
            config.agent.max_rewrite,
        )?;
        let mut orchestrator = Orchestrator::new(&config, episode, env, expander);
        orchestrator.run().await;
        Ok::<_, anyhow::Error>(orchestrator.report())
    })?;

    write_report(&out.join("report.json"), &report)?;
    write_snapshot(&out.join("snapshot.json"), &report.tree)?;
    println!(
        "{}: success={} cost=${:.4} nodes={} max_depth={}",
        report.stop.label(),
        report.env_success,
        report.cost,
        report.tree.nodes.len(),
        report.max_depth
    );
    println!("wrote {}", out.display());
    Ok(exit_codes::for_attempt(&report.stop, report.env_success))
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let (snapshot, tree) = load_snapshot(path)?;
    println!("ok: {} nodes ({})", tree.len(), snapshot.version);
    Ok(exit_codes::OK)
}

fn cmd_show(path: &Path) -> Result<i32> {
    let (snapshot, tree) = load_snapshot(path)?;
    println!(
        "{} / {} at {}",
        snapshot.meta.env_name, snapshot.meta.task_type, snapshot.meta.created_at
    );
    println!("{}", tree.summarize(SHOW_MAX_NODES));
    Ok(exit_codes::OK)
}

fn cmd_split(path: &Path) -> Result<i32> {
    let source = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let checked = split(&source).and_then(|blocks| validate(&blocks).map(|()| blocks));
    match checked {
        Ok(blocks) => {
            for (index, block) in blocks.iter().enumerate() {
                println!("--- block {index}");
                println!("{block}");
            }
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(exit_codes::INVALID)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["recode", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["recode", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_defaults_config_path() {
        let cli = Cli::parse_from(["recode", "run", "--task", "tasks/put_mug.toml"]);
        let Command::Run { task, config, out } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(task, PathBuf::from("tasks/put_mug.toml"));
        assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(out.is_none());
    }

    #[test]
    fn parse_snapshot_commands() {
        let cli = Cli::parse_from(["recode", "show", "runs/a/snapshot.json"]);
        assert!(matches!(cli.command, Command::Show { .. }));
        let cli = Cli::parse_from(["recode", "split", "reply.py"]);
        assert!(matches!(cli.command, Command::Split { .. }));
    }
}
