use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::path::join_tree_path;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config format error: {0}")]
    Format(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings shared by every component; passed in explicitly, never global
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Remote that tracks the published branch
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch holding the published documentation
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Directory inside the branch under which versions are published
    #[serde(default)]
    pub deploy_prefix: String,

    /// File name of the versions registry
    #[serde(default = "default_versions_file")]
    pub versions_file: String,

    /// Abort instead of warning when local and remote histories diverged
    #[serde(default)]
    pub strict: bool,

    /// Skip remote synchronization entirely
    #[serde(default)]
    pub ignore_remote_status: bool,

    /// Rebuild alias directories as copies of their version
    #[serde(default)]
    pub alias_copies: bool,

    /// Identity recorded on new commits
    #[serde(default)]
    pub committer: CommitterConfig,
}

/// Committer identity settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitterConfig {
    #[serde(default = "default_committer_name")]
    pub name: String,

    #[serde(default = "default_committer_email")]
    pub email: String,
}

// Default functions for serde
fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "gh-pages".to_string()
}

fn default_versions_file() -> String {
    "versions.json".to_string()
}

fn default_committer_name() -> String {
    "docver".to_string()
}

fn default_committer_email() -> String {
    "docver@localhost".to_string()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            branch: default_branch(),
            deploy_prefix: String::new(),
            versions_file: default_versions_file(),
            strict: false,
            ignore_remote_status: false,
            alias_copies: false,
            committer: CommitterConfig::default(),
        }
    }
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            name: default_committer_name(),
            email: default_committer_email(),
        }
    }
}

impl DeployConfig {
    /// Load configuration from a file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content)
                    .map_err(|e| ConfigError::Format(format!("Failed to parse config: {}", e)))?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Load from an explicit path, or from the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) if !path.exists() => Err(ConfigError::Invalid(format!(
                "config file {} does not exist",
                path.display()
            ))),
            Some(path) => Self::from_file(path),
            None => Self::from_file(&Self::default_location()),
        }
    }

    /// Get the default configuration location
    pub fn default_location() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("~/.config"));
        path.push("docver");
        path.push("config.toml");
        path
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Format(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Reject values that cannot name a ref or a tree path
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.trim().is_empty() {
            return Err(ConfigError::Invalid("remote must not be empty".to_string()));
        }
        if self.branch.trim().is_empty() {
            return Err(ConfigError::Invalid("branch must not be empty".to_string()));
        }
        if self.versions_file.is_empty() || self.versions_file.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "versions_file must be a plain file name, got '{}'",
                self.versions_file
            )));
        }
        if self.deploy_prefix.split(['/', '\\']).any(|c| c == "..") {
            return Err(ConfigError::Invalid(format!(
                "deploy_prefix must stay inside the branch, got '{}'",
                self.deploy_prefix
            )));
        }
        Ok(())
    }

    /// Deploy prefix in the form tree paths are stored in; empty is the root
    pub fn tree_prefix(&self) -> String {
        self.deploy_prefix
            .split(['/', '\\'])
            .filter(|c| !c.is_empty() && *c != ".")
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Tree path of the versions registry
    pub fn versions_path(&self) -> String {
        join_tree_path(&self.tree_prefix(), &self.versions_file)
    }

    /// Tree path of the directory holding one version (or alias)
    pub fn version_dir(&self, name: &str) -> String {
        join_tree_path(&self.tree_prefix(), name)
    }
}
