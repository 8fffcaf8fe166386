//! The published result of a reconciliation cycle and its readers.
//!
//! One writer (the reconciliation loop) replaces the whole snapshot at once
//! through a `watch` channel; readers clone the `Arc` and never block it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::LoadedConfig;
use crate::git::{Hash, RevSpec, Revision};
use crate::manifest::{ImageDiff, ImageSet, ManifestDiff, ObjectId};

use super::error::ResolutionError;

/// What one environment looked like during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSnapshot {
    pub name: String,
    /// Commit of the checkout the manifests were read from.
    pub revision: Hash,
    /// Number of workload objects found.
    pub objects: usize,
    pub images: ImageSet,
}

/// Outcome of resolving one changed image to source revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ImageStatus {
    /// Tags on both sides mapped to revisions; `revisions` is the log between them.
    Resolved {
        repository: String,
        range: RevSpec,
        revisions: Vec<Revision>,
    },
    /// The image is declared in one environment only.
    Unpaired {
        repository: String,
        environment: String,
        revision: String,
    },
    Failed { error: ResolutionError },
}

impl ImageStatus {
    pub fn error(&self) -> Option<&ResolutionError> {
        match self {
            ImageStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

impl From<ResolutionError> for ImageStatus {
    fn from(error: ResolutionError) -> Self {
        ImageStatus::Failed { error }
    }
}

/// Immutable result of one successful cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub generation: u64,
    pub completed_at: DateTime<Utc>,
    /// Commit of the config repository the cycle ran against.
    pub config_revision: Hash,
    pub source: EnvironmentSnapshot,
    pub target: EnvironmentSnapshot,
    pub diff: ManifestDiff,
    /// Resolution per distinct image name in `diff`.
    pub images: BTreeMap<String, ImageStatus>,
    #[serde(skip)]
    pub config: Arc<LoadedConfig>,
}

impl ClusterSnapshot {
    pub fn environment(&self, name: &str) -> Option<&EnvironmentSnapshot> {
        [&self.source, &self.target]
            .into_iter()
            .find(|env| env.name == name)
    }

    /// Poll interval requested by the config document, if any.
    pub fn poll_interval(&self) -> Option<Duration> {
        self.config.config.spec.poll_interval()
    }

    /// Diff entries joined with the resolution of their image.
    pub fn diff_with_revisions(&self) -> Vec<DiffEntry> {
        self.diff
            .entries()
            .map(|(object, change)| DiffEntry {
                object: object.clone(),
                change: change.clone(),
                status: self.images.get(change.image()).cloned(),
            })
            .collect()
    }
}

/// One image change of one object, with its resolved revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub object: ObjectId,
    pub change: ImageDiff,
    pub status: Option<ImageStatus>,
}

/// Lifecycle state of the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DifferState {
    Initializing,
    Polling,
    Synced,
    SyncFailed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifferStatus {
    pub state: DifferState,
    pub last_error: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    /// Generation of the last published snapshot, 0 before the first one.
    pub generation: u64,
}

impl Default for DifferStatus {
    fn default() -> Self {
        Self {
            state: DifferState::Initializing,
            last_error: None,
            last_attempt: None,
            last_success: None,
            generation: 0,
        }
    }
}

/// Write side of the snapshot and status channels.
#[derive(Debug)]
pub struct SnapshotPublisher {
    snapshot: watch::Sender<Option<Arc<ClusterSnapshot>>>,
    status: watch::Sender<DifferStatus>,
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(None);
        let (status, _) = watch::channel(DifferStatus::default());
        Self { snapshot, status }
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            snapshot: self.snapshot.subscribe(),
            status: self.status.subscribe(),
        }
    }

    /// Replaces the current snapshot.
    pub fn publish(&self, snapshot: ClusterSnapshot) -> Arc<ClusterSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.snapshot.send_replace(Some(Arc::clone(&snapshot)));
        snapshot
    }

    pub fn current(&self) -> Option<Arc<ClusterSnapshot>> {
        self.snapshot.borrow().clone()
    }

    pub fn update_status(&self, update: impl FnOnce(&mut DifferStatus)) {
        self.status.send_modify(update);
    }
}

/// Read side, cheap to clone and safe to share between request handlers.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    snapshot: watch::Receiver<Option<Arc<ClusterSnapshot>>>,
    status: watch::Receiver<DifferStatus>,
}

impl SnapshotReader {
    /// The latest snapshot, `None` until the first cycle succeeds.
    pub fn current(&self) -> Option<Arc<ClusterSnapshot>> {
        self.snapshot.borrow().clone()
    }

    pub fn diff(&self) -> Option<ManifestDiff> {
        self.current().map(|snapshot| snapshot.diff.clone())
    }

    pub fn diff_with_revisions(&self) -> Option<Vec<DiffEntry>> {
        self.current().map(|snapshot| snapshot.diff_with_revisions())
    }

    pub fn status(&self) -> DifferStatus {
        self.status.borrow().clone()
    }

    /// Waits until a snapshot newer than the last one seen is published.
    ///
    /// Returns `false` once the publisher is gone.
    pub async fn changed(&mut self) -> bool {
        self.snapshot.changed().await.is_ok()
    }
}
