//! Remote repository addresses.
//!
//! A repository can be named either by an absolute URI
//! (`https://github.com/weaveworks/cortex`, `ssh://git@host/repo.git`,
//! `file:///srv/git/config`) or by the SCP-like shorthand git accepts
//! (`git@github.com:weaveworks/cortex.git`). Both forms render back to the
//! exact text they were parsed from, and that canonical text is what gets
//! handed to `git` and hashed into the local mirror name.
//!
//! Parsing tries the URI form first. Only URIs with an authority or a
//! hierarchical path are accepted as URIs; `host:path` strings that the URI
//! grammar would read as an opaque scheme fall through to the SCP form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Errors from parsing a repository address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("repository address is empty")]
    Empty,

    #[error("'{0}' is neither an absolute URI nor a user@host:path address")]
    Unrecognized(String),
}

/// A parsed remote repository address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RepoAddress {
    /// Standard absolute URI.
    Uri(Url),
    /// SCP-like shorthand: `[user@]host:path`.
    Scp {
        user: Option<String>,
        host: String,
        path: String,
    },
}

impl RepoAddress {
    /// Parses an address, trying the URI form before the SCP shorthand.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AddressError::Empty);
        }

        if let Ok(url) = Url::parse(input) {
            if !url.cannot_be_a_base() {
                return Ok(RepoAddress::Uri(url));
            }
        }

        Self::parse_scp(input).ok_or_else(|| AddressError::Unrecognized(input.to_string()))
    }

    fn parse_scp(input: &str) -> Option<Self> {
        let (prefix, path) = input.split_once(':')?;
        if prefix.contains('/') || path.is_empty() {
            return None;
        }

        let (user, host) = match prefix.rsplit_once('@') {
            Some((user, host)) => {
                if user.is_empty() {
                    return None;
                }
                (Some(user.to_string()), host)
            }
            None => (None, prefix),
        };

        if host.is_empty() {
            return None;
        }

        Some(RepoAddress::Scp {
            user,
            host: host.to_string(),
            path: path.to_string(),
        })
    }

    /// Returns the canonical text form.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Returns the repository path component.
    pub fn path(&self) -> &str {
        match self {
            RepoAddress::Uri(url) => url.path(),
            RepoAddress::Scp { path, .. } => path,
        }
    }

    /// Final path segment with any `.git` suffix removed, e.g. `cortex`.
    pub fn last_segment(&self) -> String {
        let trimmed = self.path().trim_end_matches('/');
        let segment = trimmed.rsplit('/').next().unwrap_or("");
        let segment = segment.strip_suffix(".git").unwrap_or(segment);

        if segment.is_empty() {
            "repo".to_string()
        } else {
            segment.to_string()
        }
    }

    /// Deterministic directory name for the local mirror of this address:
    /// `<sha256(canonical)>-<last segment>`.
    pub fn storage_name(&self) -> String {
        let digest = Sha256::digest(self.canonical().as_bytes());
        format!("{}-{}", hex::encode(digest), self.last_segment())
    }
}

impl fmt::Display for RepoAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoAddress::Uri(url) => f.write_str(url.as_str()),
            RepoAddress::Scp {
                user: Some(user),
                host,
                path,
            } => write!(f, "{}@{}:{}", user, host, path),
            RepoAddress::Scp {
                user: None,
                host,
                path,
            } => write!(f, "{}:{}", host, path),
        }
    }
}

impl FromStr for RepoAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepoAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepoAddress> for String {
    fn from(address: RepoAddress) -> Self {
        address.canonical()
    }
}
