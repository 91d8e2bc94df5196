//! Configuration management for Vibeflow.
//!
//! Handles loading configuration from TOML files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::state::sanitize_branch;
use crate::workflow::OVERRIDE_DIR;

/// Environment variable overriding `workflows.domains` (comma-separated).
pub const DOMAINS_ENV: &str = "VIBE_WORKFLOW_DOMAINS";

/// Placeholder replaced by the branch name in `plan.file_pattern`.
const BRANCH_PLACEHOLDER: &str = "{branch}";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workflow selection and validation
    pub workflows: WorkflowsConfig,

    /// Conversation state storage
    pub state: StateConfig,

    /// Plan file naming
    pub plan: PlanConfig,
}

/// Workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    /// Workflow used for new conversations
    pub default: String,

    /// Domains shown when listing workflows (empty shows all)
    pub domains: Vec<String>,

    /// State ids every workflow must declare
    pub required_states: Vec<String>,
}

/// State storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory for conversation records, relative to the project
    /// (default: `.vibe/conversations`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Plan file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// File name inside `.vibe/`; `{branch}` is replaced by the branch name
    pub file_pattern: String,
}

impl Config {
    /// Load configuration for a project.
    ///
    /// Looks for config in:
    /// 1. `.vibe/config.toml` in the project
    /// 2. `~/.config/vibeflow/config.toml`
    /// 3. Falls back to defaults
    ///
    /// `VIBE_WORKFLOW_DOMAINS` is applied on top.
    pub fn load(project_path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load_file_chain(project_path)?;
        config.apply_env();
        Ok(config)
    }

    fn load_file_chain(project_path: &Path) -> anyhow::Result<Self> {
        // Try project config first
        let local_config = project_path.join(OVERRIDE_DIR).join("config.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        // Try global config
        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
        tracing::debug!(path = ?path, "Loaded config");
        Ok(config)
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(DOMAINS_ENV) {
            self.workflows.domains = value
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Directory for conversation records of a project.
    pub fn state_dir(&self, project_path: &Path) -> PathBuf {
        match &self.state.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_path.join(dir),
            None => project_path.join(OVERRIDE_DIR).join("conversations"),
        }
    }

    /// Plan file path for a branch.
    pub fn plan_file_path(&self, project_path: &Path, branch: Option<&str>) -> PathBuf {
        let branch = sanitize_branch(branch.unwrap_or("main"));
        let file_name = self.plan.file_pattern.replace(BRANCH_PLACEHOLDER, &branch);
        project_path.join(OVERRIDE_DIR).join(file_name)
    }

    /// Get the global config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("vibeflow"))
    }
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self { default: "waterfall".to_string(), domains: Vec::new(), required_states: Vec::new() }
    }
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self { file_pattern: "development-plan-{branch}.md".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.workflows.default, "waterfall");
        assert!(config.workflows.domains.is_empty());
        assert!(config.state.dir.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[workflows]"));
        assert!(toml_str.contains("[plan]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [workflows]
            default = "epcc"
            required_states = ["complete"]

            [state]
            dir = "state"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.workflows.default, "epcc");
        assert_eq!(config.workflows.required_states, vec!["complete"]);
        assert_eq!(config.state_dir(Path::new("/work/shop")), PathBuf::from("/work/shop/state"));
        assert_eq!(config.plan.file_pattern, "development-plan-{branch}.md");
    }

    #[test]
    fn test_state_dir_default() {
        let config = Config::default();
        assert_eq!(
            config.state_dir(Path::new("/work/shop")),
            PathBuf::from("/work/shop/.vibe/conversations")
        );
    }

    #[test]
    fn test_plan_file_path() {
        let config = Config::default();
        assert_eq!(
            config.plan_file_path(Path::new("/work/shop"), Some("feature/login")),
            PathBuf::from("/work/shop/.vibe/development-plan-feature-login.md")
        );
        assert_eq!(
            config.plan_file_path(Path::new("/work/shop"), None),
            PathBuf::from("/work/shop/.vibe/development-plan-main.md")
        );
    }

    #[test]
    #[serial]
    fn test_project_config_file() {
        let temp = TempDir::new().unwrap();
        let vibe = temp.path().join(OVERRIDE_DIR);
        std::fs::create_dir_all(&vibe).unwrap();
        std::fs::write(vibe.join("config.toml"), "[workflows]\ndefault = \"tdd\"\n").unwrap();

        std::env::remove_var(DOMAINS_ENV);
        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.workflows.default, "tdd");
    }

    #[test]
    #[serial]
    fn test_domains_from_env() {
        std::env::set_var(DOMAINS_ENV, "code, office,,");
        let mut config = Config::default();
        config.apply_env();
        std::env::remove_var(DOMAINS_ENV);

        assert_eq!(config.workflows.domains, vec!["code", "office"]);
    }
}
