pub mod config;
pub mod differ;
pub mod error;
pub mod git;
pub mod manifest;
pub mod policy;

pub use config::{load_config, DiffConfig, DifferSettings, LoadedConfig};
pub use differ::{
    ClusterDiffer, ClusterSnapshot, DiffScheduler, DifferError, DifferState, DifferStatus,
    ImageStatus, ResolutionError, SnapshotReader,
};
pub use error::{EnvDiffError, Result};
pub use git::{GitError, GitStore, RepoAddress};
pub use manifest::{ImageDiff, ManifestDiff, ManifestObject, ObjectId};
pub use policy::{PolicyError, PolicySet, RevisionPolicy};
