//! The process boundary for every `git` invocation.
//!
//! All repository work goes through [`GitRunner::run`], so tests can swap
//! the real binary for a scripted fake without spawning processes.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::error::{GitError, Result};

/// Captured output of a successful git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs git with the given arguments, optionally inside `cwd`.
///
/// A non-zero exit must be reported as [`GitError::Process`].
pub trait GitRunner: Send + Sync {
    fn run(&self, args: &[&str], cwd: Option<&Path>) -> Result<GitOutput>;
}

/// Runs the `git` binary found on `PATH` (or an explicit binary path).
#[derive(Debug, Clone)]
pub struct SystemGit {
    binary: PathBuf,
}

impl SystemGit {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitRunner for SystemGit {
    fn run(&self, args: &[&str], cwd: Option<&Path>) -> Result<GitOutput> {
        let command = command_line(&self.binary, args);

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            // never block the loop on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        log::debug!("Running {}", command);

        let output = cmd.output().map_err(|e| GitError::Spawn {
            command: command.clone(),
            source: e,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(GitOutput { stdout, stderr })
        } else {
            Err(GitError::Process {
                command,
                exit_code: output.status.code(),
                stdout,
                stderr,
                cwd: cwd.map(Path::to_path_buf),
            })
        }
    }
}

fn command_line(binary: &Path, args: &[&str]) -> String {
    let mut line = binary.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
