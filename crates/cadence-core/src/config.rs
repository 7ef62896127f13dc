//! Engine configuration stored as TOML.
//!
//! Every field has a default, so a missing file or a partial file is valid.
//! The default location is `$XDG_CONFIG_HOME/cadence/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigResultExt, EngineError, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub backlog: BacklogConfig,
    pub plan: PlanConfig,
    pub scheduler: SchedulerConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BacklogConfig {
    /// Goals per scope that are still Active or Paused.
    pub max_goals: u32,
    pub max_tasks_per_goal: u32,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            max_goals: 3,
            max_tasks_per_goal: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlanConfig {
    pub enabled: bool,
    /// Live plans engine-wide, counted across all scopes together.
    pub max_plans: u32,
    pub max_steps_per_plan: u32,
    /// Stop a run at the first failed step instead of moving on.
    pub stop_on_failure: bool,
    /// Step results are cut to this many characters.
    pub max_result_length: usize,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_plans: 5,
            max_steps_per_plan: 50,
            stop_on_failure: true,
            max_result_length: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Auto mode at first start. Once toggled at runtime the stored switch
    /// wins.
    pub auto_start: bool,
    pub tick_interval_secs: u64,
    /// Upper bound for one work-runner call made by a schedule.
    pub task_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_start: true,
            tick_interval_secs: 30,
            task_timeout_secs: 600,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Channel types that isolate conversations from each other.
    pub scoped_channels: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scoped_channels: vec!["web".to_string(), "telegram".to_string()],
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool); 6] = [
            ("backlog.max_goals", self.backlog.max_goals > 0),
            ("backlog.max_tasks_per_goal", self.backlog.max_tasks_per_goal > 0),
            ("plan.max_plans", self.plan.max_plans > 0),
            ("plan.max_steps_per_plan", self.plan.max_steps_per_plan > 0),
            ("scheduler.tick_interval_secs", self.scheduler.tick_interval_secs > 0),
            ("scheduler.task_timeout_secs", self.scheduler.task_timeout_secs > 0),
        ];
        for (field, ok) in checks {
            if !ok {
                return Err(EngineError::Configuration {
                    message: format!("{field} must be > 0"),
                });
            }
        }
        if self.plan.max_result_length < 4 {
            return Err(EngineError::Configuration {
                message: "plan.max_result_length must be at least 4".to_string(),
            });
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|e| EngineError::FileSystem {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: EngineConfig =
        toml::from_str(&contents).config_context(&format!("parse {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Returns the existing config file under the XDG config directories, if any.
pub fn default_config_path() -> Option<PathBuf> {
    xdg::BaseDirectories::with_prefix("cadence").find_config_file("config.toml")
}
