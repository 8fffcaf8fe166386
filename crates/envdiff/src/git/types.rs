//! Pure data types for git operations.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A commit hash as printed by git. Never parsed, only passed along.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(String);

impl Hash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A revision expression such as `f7f6cf9e`, `master` or `a..b`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevSpec(String);

impl RevSpec {
    pub fn new(spec: impl Into<String>) -> Self {
        Self(spec.into())
    }

    /// Composes `start..end`: commits reachable from `end` but not `start`.
    pub fn range(start: &RevSpec, end: &RevSpec) -> Self {
        Self(format!("{}..{}", start.0, end.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Hash> for RevSpec {
    fn from(hash: Hash) -> Self {
        Self(hash.0)
    }
}

/// One entry of a first-parent log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    /// Full commit hash.
    pub hash: Hash,
    /// Author name.
    pub author: String,
    /// Commit timestamp.
    pub timestamp: DateTime<Utc>,
    /// First line of the commit message.
    pub subject: String,
}

/// What `sync` had to do to bring a mirror up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncKind {
    Cloned,
    Fetched,
}

/// Result of `ensure_checkout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    /// Commit the branch resolved to.
    pub hash: Hash,
    /// Worktree directory for that commit.
    pub worktree: PathBuf,
    /// The stable link that now points at `worktree`.
    pub link: PathBuf,
    /// Whether the worktree had to be created.
    pub created: bool,
    /// Previous link target, if the link was repointed.
    pub previous: Option<PathBuf>,
}
