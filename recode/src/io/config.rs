//! Configuration stored in `recode.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "recode.toml";

/// Top-level configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecodeConfig {
    pub agent: AgentConfig,
    pub evaluator: EvaluatorConfig,
    pub model: ModelConfig,
    /// Per-model token prices; the `default` entry covers unknown models.
    pub prices: BTreeMap<String, ModelPrice>,
    pub resources: ResourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Stubs at this depth or deeper end the attempt instead of expanding.
    pub max_depth: usize,
    /// Recorded in snapshot metadata for run bookkeeping.
    pub max_retry: usize,
    /// Extra expansion requests allowed after a rejected reply.
    pub max_rewrite: usize,
    /// Outer bound on orchestrator turns.
    pub max_turns: usize,
    /// Name fragments call to act in the environment.
    pub primitive_name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_retry: 5,
            max_rewrite: 5,
            max_turns: 500,
            primitive_name: "run".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// `while` iterations allowed per fragment before a `RuntimeError`.
    pub max_loop_iterations: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    /// OpenAI-compatible API root, without `/chat/completions`.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Fractional jitter applied to each backoff delay (0.1 = ±10%).
    pub retry_jitter: f64,
    pub track_costs: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: 2048,
            timeout_secs: 60,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_jitter: 0.1,
            track_costs: true,
        }
    }
}

/// USD per million tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResourcesConfig {
    /// Holds `<env>/actions.txt` and `<env>/fewshots/*.txt`.
    pub dir: PathBuf,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("resources"),
        }
    }
}

pub fn default_prices() -> BTreeMap<String, ModelPrice> {
    [
        ("default", 0.15, 0.60),
        ("gpt-4o-mini", 0.15, 0.60),
        ("gpt-4o", 2.50, 10.00),
        ("gpt-4.1-mini", 0.40, 1.60),
    ]
    .into_iter()
    .map(|(name, input, output)| (name.to_string(), ModelPrice { input, output }))
    .collect()
}

impl Default for RecodeConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            evaluator: EvaluatorConfig::default(),
            model: ModelConfig::default(),
            prices: default_prices(),
            resources: ResourcesConfig::default(),
        }
    }
}

impl RecodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_turns == 0 {
            return Err(anyhow!("agent.max_turns must be > 0"));
        }
        if !is_identifier(&self.agent.primitive_name) {
            return Err(anyhow!(
                "agent.primitive_name must be an identifier, got '{}'",
                self.agent.primitive_name
            ));
        }
        if self.evaluator.max_loop_iterations == 0 {
            return Err(anyhow!("evaluator.max_loop_iterations must be > 0"));
        }
        if self.model.model.trim().is_empty() {
            return Err(anyhow!("model.model must be non-empty"));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.model.retry_jitter) {
            return Err(anyhow!("model.retry_jitter must be within 0.0..=1.0"));
        }
        for (name, price) in &self.prices {
            if price.input < 0.0 || price.output < 0.0 {
                return Err(anyhow!("prices.{name} must not be negative"));
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RecodeConfig::default()`.
pub fn load_config(path: &Path) -> Result<RecodeConfig> {
    if !path.exists() {
        let cfg = RecodeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RecodeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RecodeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RecodeConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("recode.toml");
        let mut cfg = RecodeConfig::default();
        cfg.agent.max_depth = 4;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert!(!temp.path().join("recode.toml.tmp").exists());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("recode.toml");
        fs::write(&path, "[agent]\nmax_rewrite = 2\n\n[model]\nmodel = \"gpt-4o\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.agent.max_rewrite, 2);
        assert_eq!(cfg.agent.max_depth, 10);
        assert_eq!(cfg.model.model, "gpt-4o");
        assert_eq!(cfg.model.timeout_secs, 60);
        assert!(cfg.prices.contains_key("default"));
    }

    #[test]
    fn rejects_bad_primitive_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("recode.toml");
        fs::write(&path, "[agent]\nprimitive_name = \"do it\"\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("primitive_name"));
    }
}
