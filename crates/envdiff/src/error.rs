use thiserror::Error;

use crate::config::ConfigError;
use crate::differ::DifferError;
use crate::git::{AddressError, GitError};
use crate::manifest::ManifestError;
use crate::policy::PolicyError;

#[derive(Error, Debug)]
pub enum EnvDiffError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Differ error: {0}")]
    Differ(#[from] DifferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EnvDiffError>;
