//! Revision policies: how an image tag maps to a git revision.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Template used when a regex policy does not give one: the first capture group.
pub const DEFAULT_OUTPUT: &str = "$1";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Tag '{tag}' does not match pattern '{pattern}'")]
    NoMatch { tag: String, pattern: String },

    #[error("Invalid policy pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Tag '{tag}' expands to an empty revision")]
    EmptyRevision { tag: String },
}

pub type Result<T> = std::result::Result<T, PolicyError>;

/// A policy as written in the config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PolicySpec {
    /// The tag is the revision.
    Identity,
    /// The revision is extracted from the tag with a regular expression.
    Regex {
        #[serde(rename = "match")]
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
}

/// A compiled revision policy.
#[derive(Debug, Clone)]
pub enum RevisionPolicy {
    Identity,
    Regex { pattern: Regex, output: String },
}

impl RevisionPolicy {
    /// Compiles a regex policy.
    ///
    /// With the default template the pattern must have a capture group,
    /// otherwise every tag would expand to nothing.
    pub fn regex(pattern: &str, output: Option<&str>) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| PolicyError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        if output.is_none() && regex.captures_len() < 2 {
            return Err(PolicyError::InvalidPattern {
                pattern: pattern.to_string(),
                message: "pattern has no capture group".to_string(),
            });
        }

        Ok(RevisionPolicy::Regex {
            pattern: regex,
            output: output.unwrap_or(DEFAULT_OUTPUT).to_string(),
        })
    }

    pub fn from_spec(spec: &PolicySpec) -> Result<Self> {
        match spec {
            PolicySpec::Identity => Ok(RevisionPolicy::Identity),
            PolicySpec::Regex { pattern, output } => Self::regex(pattern, output.as_deref()),
        }
    }

    /// Maps an image tag to a revision specifier.
    pub fn apply(&self, tag: &str) -> Result<String> {
        let revision = match self {
            RevisionPolicy::Identity => tag.to_string(),
            RevisionPolicy::Regex { pattern, output } => {
                let captures = pattern.captures(tag).ok_or_else(|| PolicyError::NoMatch {
                    tag: tag.to_string(),
                    pattern: pattern.as_str().to_string(),
                })?;
                let mut revision = String::new();
                captures.expand(output, &mut revision);
                revision
            }
        };

        if revision.is_empty() {
            return Err(PolicyError::EmptyRevision {
                tag: tag.to_string(),
            });
        }
        Ok(revision)
    }
}

/// Compiled policies by name.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: BTreeMap<String, RevisionPolicy>,
}

impl PolicySet {
    /// Compiles every policy, failing on the first invalid one.
    pub fn compile<'a>(
        specs: impl IntoIterator<Item = (&'a String, &'a PolicySpec)>,
    ) -> std::result::Result<Self, (String, PolicyError)> {
        let mut policies = BTreeMap::new();
        for (name, spec) in specs {
            let policy = RevisionPolicy::from_spec(spec).map_err(|e| (name.clone(), e))?;
            policies.insert(name.clone(), policy);
        }
        Ok(Self { policies })
    }

    pub fn get(&self, name: &str) -> Option<&RevisionPolicy> {
        self.policies.get(name)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
