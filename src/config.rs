//! TOML configuration for taskblame
//!
//! Every section is optional; missing keys fall back to the defaults of the
//! classic task-export layout.
//!
//! # Example taskblame.toml
//!
//! ```toml
//! [export]
//! steps = "dynflow_steps.csv"
//!
//! [blame]
//! metric = "all"
//!
//! [polling]
//! base_interval_secs = 16
//! ```

use crate::report::MetricSelection;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub export: ExportConfig,
    pub blame: BlameConfig,
    pub heat: HeatConfig,
    pub polling: PollingConfig,
}

/// File names inside a task-export directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub tasks: String,
    pub steps: String,
    pub actions: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            tasks: "foreman_tasks_tasks".to_string(),
            steps: "dynflow_steps".to_string(),
            actions: "dynflow_actions".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn tasks_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.tasks)
    }

    pub fn steps_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.steps)
    }

    pub fn actions_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.actions)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlameConfig {
    /// Metric shown when `--metric` is not given
    pub metric: MetricSelection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatConfig {
    /// Rows in each top-labels table
    pub items_limit: usize,
}

impl Default for HeatConfig {
    fn default() -> Self {
        Self { items_limit: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Polling period in seconds before the multiplier is applied
    pub base_interval_secs: u64,
    /// Slack for whole-second log timestamps
    pub rounding_error_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: 16,
            rounding_error_secs: 2,
        }
    }
}

impl Config {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.heat.items_limit == 0 {
            anyhow::bail!("heat.items_limit must be >= 1");
        }
        if self.polling.base_interval_secs == 0 {
            anyhow::bail!("polling.base_interval_secs must be >= 1");
        }
        for (key, name) in [
            ("export.tasks", &self.export.tasks),
            ("export.steps", &self.export.steps),
            ("export.actions", &self.export.actions),
        ] {
            if name.trim().is_empty() {
                anyhow::bail!("{} must not be empty", key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.export.steps, "dynflow_steps");
        assert_eq!(config.blame.metric, MetricSelection::RelativeBlame);
        assert_eq!(config.heat.items_limit, 5);
        assert_eq!(config.polling.base_interval_secs, 16);
        assert_eq!(config.polling.rounding_error_secs, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
[export]
steps = "steps.csv"

[blame]
metric = "all"
"#,
        )
        .unwrap();

        assert_eq!(config.export.steps, "steps.csv");
        assert_eq!(config.export.actions, "dynflow_actions");
        assert_eq!(config.blame.metric, MetricSelection::All);
        assert_eq!(config.heat, HeatConfig::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_rejects_zero_items_limit() {
        let err = Config::from_toml_str("[heat]\nitems_limit = 0\n").unwrap_err();
        assert!(err.to_string().contains("items_limit"));
    }

    #[test]
    fn test_rejects_zero_polling_interval() {
        assert!(Config::from_toml_str("[polling]\nbase_interval_secs = 0\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_metric() {
        assert!(Config::from_toml_str("[blame]\nmetric = \"median\"\n").is_err());
    }

    #[test]
    fn test_export_paths() {
        let config = ExportConfig::default();
        let dir = Path::new("/data/export");
        assert_eq!(
            config.actions_path(dir),
            PathBuf::from("/data/export/dynflow_actions")
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskblame.toml");
        std::fs::write(&path, "[heat]\nitems_limit = 3\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.heat.items_limit, 3);
        assert!(Config::from_file(dir.path().join("missing.toml")).is_err());
    }
}
