//! Manifest loading errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Failed to read manifest '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk manifest directory '{path}': {message}")]
    Walk { path: PathBuf, message: String },

    #[error("Failed to parse YAML in '{path}': {message}")]
    ParseYaml { path: PathBuf, message: String },

    #[error("Invalid manifest in '{path}': {message}")]
    InvalidManifest { path: PathBuf, message: String },
}

impl From<serde_yaml::Error> for ManifestError {
    fn from(err: serde_yaml::Error) -> Self {
        ManifestError::ParseYaml {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl ManifestError {
    /// Attaches the file the error came from.
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match self {
            ManifestError::ParseYaml { message, .. } => ManifestError::ParseYaml { path, message },
            ManifestError::InvalidManifest { message, .. } => {
                ManifestError::InvalidManifest { path, message }
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ManifestError>;
