//! Bootstrap settings, fixed for the lifetime of a differ.

use std::path::PathBuf;
use std::time::Duration;

use crate::git::RepoAddress;

use super::error::{ConfigError, Result};
use super::{DEFAULT_BRANCH, DEFAULT_CONFIG_PATH, DEFAULT_POLL_INTERVAL};

/// Settings the differ is started with, before any config document is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifferSettings {
    /// Root directory for mirrors, worktrees and checkout links.
    pub git_repo_dir: PathBuf,
    /// Address of the repository holding the config document.
    pub config_repo: String,
    pub config_branch: String,
    /// Path of the config document inside the config checkout.
    pub config_path: PathBuf,
    /// Used until a config document overrides it.
    pub poll_interval: Duration,
}

impl DifferSettings {
    pub fn new(git_repo_dir: impl Into<PathBuf>, config_repo: impl Into<String>) -> Self {
        Self {
            git_repo_dir: git_repo_dir.into(),
            config_repo: config_repo.into(),
            config_branch: DEFAULT_BRANCH.to_string(),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Checks the settings and returns the parsed config repository address.
    pub fn validate(&self) -> Result<RepoAddress> {
        if self.git_repo_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidSettings(
                "git repository directory must not be empty".to_string(),
            ));
        }
        if self.config_branch.trim().is_empty() {
            return Err(ConfigError::InvalidSettings(
                "config branch must not be empty".to_string(),
            ));
        }
        if self.config_path.as_os_str().is_empty() || self.config_path.is_absolute() {
            return Err(ConfigError::InvalidSettings(format!(
                "config path '{}' must be a relative file path",
                self.config_path.display()
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidSettings(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        RepoAddress::parse(&self.config_repo)
            .map_err(|e| ConfigError::InvalidSettings(format!("config repository: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = DifferSettings::new("/var/lib/envdiff", "git@github.com:weaveworks/config");
        assert_eq!(settings.config_branch, "master");
        assert_eq!(settings.config_path, PathBuf::from("envdiff.yaml"));
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_settings() {
        let base = DifferSettings::new("/var/lib/envdiff", "git@github.com:weaveworks/config");

        let mut settings = base.clone();
        settings.config_repo = "not a repository".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidSettings(_))
        ));

        let mut settings = base.clone();
        settings.config_branch = " ".to_string();
        assert!(settings.validate().is_err());

        let mut settings = base.clone();
        settings.poll_interval = Duration::ZERO;
        assert!(settings.validate().is_err());

        let mut settings = base;
        settings.config_path = PathBuf::from("/etc/envdiff.yaml");
        assert!(settings.validate().is_err());
    }
}
