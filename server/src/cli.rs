//! Command-line flags.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use envdiff::DifferSettings;

use crate::logging::LogFormat;

/// Continuously compares the source revisions deployed to two environments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding repository mirrors, worktrees and checkout links.
    #[arg(long, env = "ENVDIFF_GIT_REPO_DIR")]
    pub git_repo_dir: PathBuf,

    /// Repository containing the config document and manifests.
    #[arg(long, env = "ENVDIFF_CONFIG_REPO")]
    pub config_repo: String,

    #[arg(long, env = "ENVDIFF_CONFIG_BRANCH", default_value = envdiff::config::DEFAULT_BRANCH)]
    pub config_branch: String,

    /// Path of the config document inside the config repository.
    #[arg(long, env = "ENVDIFF_CONFIG_PATH", default_value = envdiff::config::DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,

    /// Seconds between cycles until the config document sets its own interval.
    #[arg(long, env = "ENVDIFF_POLL_INTERVAL_SECS", default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// The address to listen on.
    #[arg(long, env = "ENVDIFF_LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub listen_address: SocketAddr,

    /// Log filter, e.g. `info` or `envdiff=debug`. Overrides RUST_LOG.
    #[arg(long, env = "ENVDIFF_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, value_enum, env = "ENVDIFF_LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn settings(&self) -> DifferSettings {
        DifferSettings {
            git_repo_dir: self.git_repo_dir.clone(),
            config_repo: self.config_repo.clone(),
            config_branch: self.config_branch.clone(),
            config_path: self.config_path.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from([
            "envdiff-server",
            "--git-repo-dir",
            "/var/lib/envdiff",
            "--config-repo",
            "git@github.com:weaveworks/config",
        ])
        .unwrap();

        assert_eq!(cli.listen_address, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cli.log_format, LogFormat::Text);

        let settings = cli.settings();
        assert_eq!(settings.config_branch, "master");
        assert_eq!(settings.config_path, PathBuf::from("envdiff.yaml"));
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "envdiff-server",
            "--git-repo-dir",
            "/data",
            "--config-repo",
            "https://github.com/weaveworks/config",
            "--config-branch",
            "main",
            "--poll-interval-secs",
            "15",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.settings().config_branch, "main");
        assert_eq!(cli.settings().poll_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_requires_config_repo() {
        assert!(Cli::try_parse_from(["envdiff-server", "--git-repo-dir", "/data"]).is_err());
    }
}
