//! The reconciliation loop and the snapshot it publishes.

pub mod error;
pub mod reconciler;
pub mod resolve;
pub mod scheduler;
pub mod snapshot;

pub use error::{DifferError, ResolutionError, ResolutionErrorKind};
pub use reconciler::{ClusterDiffer, ImageChanges, CONFIG_CHECKOUT};
pub use resolve::ImageResolver;
pub use scheduler::DiffScheduler;
pub use snapshot::{
    ClusterSnapshot, DiffEntry, DifferState, DifferStatus, EnvironmentSnapshot, ImageStatus,
    SnapshotPublisher, SnapshotReader,
};
