//! Git-specific error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while driving the `git` binary or mutating the
/// mirror tree on disk.
#[derive(Error, Debug)]
pub enum GitError {
    #[error(
        "git command `{}` failed with exit code {} in '{}': {}",
        .command,
        describe_exit_code(.exit_code),
        describe_cwd(.cwd),
        summarize_output(.stdout, .stderr)
    )]
    Process {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        cwd: Option<PathBuf>,
    },

    #[error("Failed to run git command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Reference '{reference}' not found in '{mirror}'")]
    RefNotFound { reference: String, mirror: PathBuf },

    #[error("Filesystem operation on '{path}' failed: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GitError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GitError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the error says the requested ref does not exist.
    pub fn is_ref_not_found(&self) -> bool {
        matches!(self, GitError::RefNotFound { .. })
    }
}

fn describe_exit_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn describe_cwd(cwd: &Option<PathBuf>) -> String {
    cwd.as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_string())
}

/// Formats stdout and stderr of a failed command for display.
fn summarize_output(stdout: &str, stderr: &str) -> String {
    let stderr = stderr.trim();
    let stdout = stdout.trim();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => "no output".to_string(),
        (true, false) => stdout.to_string(),
        (false, true) => stderr.to_string(),
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

/// Checks whether git's stderr reports an unknown revision.
pub(crate) fn is_unknown_revision(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();

    lower.contains("bad revision")
        || lower.contains("unknown revision")
        || lower.contains("ambiguous argument")
        || lower.contains("not a valid object name")
}

/// Result type for git operations.
pub type Result<T> = std::result::Result<T, GitError>;
