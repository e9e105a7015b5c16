//! Agent configuration stored as TOML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::is_valid_amount;

/// Policy used to choose among several enabled actions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DeliberationKind {
    #[default]
    FirstEnabled,
    Random,
}

/// Agent configuration (TOML).
///
/// Missing fields default to the values used by a freshly constructed agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Target time between the starts of two ticks of an autonomous agent.
    pub sampling_interval_ms: u64,

    /// Budget consumed by every tick that executed an action.
    pub cost_per_tick: f64,

    /// Budget handed to the top goal. Absent means unbounded.
    pub initial_budget: Option<f64>,

    pub deliberation: DeliberationKind,

    /// Seed for the random deliberation policy.
    pub random_seed: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: 1000,
            cost_per_tick: 1.0,
            initial_budget: None,
            deliberation: DeliberationKind::default(),
            random_seed: 1_287_821,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sampling_interval_ms == 0 {
            return Err(anyhow!("sampling_interval_ms must be > 0"));
        }
        if !is_valid_amount(self.cost_per_tick) {
            return Err(anyhow!("cost_per_tick must be finite and > 0"));
        }
        if let Some(budget) = self.initial_budget {
            if !is_valid_amount(budget) {
                return Err(anyhow!("initial_budget must be finite and > 0"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
