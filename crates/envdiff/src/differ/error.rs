//! Reconciliation errors.

use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::config::ConfigError;
use crate::git::GitError;
use crate::manifest::ManifestError;

/// Errors that abort a reconciliation cycle or a query.
#[derive(Error, Debug)]
pub enum DifferError {
    #[error("Invalid differ settings: {0}")]
    Settings(#[source] ConfigError),

    #[error("Git operation failed: {0}")]
    Git(#[from] GitError),

    #[error("Failed to load config document: {0}")]
    Config(#[source] ConfigError),

    #[error("Failed to load manifests of environment '{environment}': {source}")]
    Manifest {
        environment: String,
        #[source]
        source: ManifestError,
    },

    #[error("Unknown environment '{0}'")]
    UnknownEnvironment(String),

    #[error("No snapshot has been published yet")]
    NoSnapshot,

    #[error("Reconciliation cancelled")]
    Cancelled,
}

impl DifferError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DifferError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, DifferError>;

/// Why a single image could not be resolved to revisions.
///
/// Recorded in the snapshot next to the image instead of failing the cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no repository configured for image '{image}'")]
    NoRepository { image: String },

    #[error("image '{image}' refers to unknown policy '{policy}'")]
    UnknownPolicy { image: String, policy: String },

    #[error("invalid configuration for image '{image}': {message}")]
    Config { image: String, message: String },

    #[error("image '{image}' has no tag in {environment}")]
    MissingTag { image: String, environment: String },

    #[error("policy failed for image '{image}': {message}")]
    Policy { image: String, message: String },

    #[error("git failed for repository '{repository}': {message}")]
    Git { repository: String, message: String },
}

impl ResolutionError {
    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> ResolutionErrorKind {
        match self {
            ResolutionError::NoRepository { .. } => ResolutionErrorKind::NoRepository,
            ResolutionError::UnknownPolicy { .. } => ResolutionErrorKind::UnknownPolicy,
            ResolutionError::Config { .. } => ResolutionErrorKind::Config,
            ResolutionError::MissingTag { .. } => ResolutionErrorKind::MissingTag,
            ResolutionError::Policy { .. } => ResolutionErrorKind::Policy,
            ResolutionError::Git { .. } => ResolutionErrorKind::Git,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionErrorKind {
    NoRepository,
    UnknownPolicy,
    Config,
    MissingTag,
    Policy,
    Git,
}

impl fmt::Display for ResolutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionErrorKind::NoRepository => "noRepository",
            ResolutionErrorKind::UnknownPolicy => "unknownPolicy",
            ResolutionErrorKind::Config => "config",
            ResolutionErrorKind::MissingTag => "missingTag",
            ResolutionErrorKind::Policy => "policy",
            ResolutionErrorKind::Git => "git",
        };
        f.write_str(name)
    }
}

impl Serialize for ResolutionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResolutionError", 2)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
