//! The reconciliation cycle: sync → checkout → load → diff → resolve → publish.
//!
//! A cycle either publishes a complete snapshot or leaves the previous one in
//! place. Git and filesystem work is blocking and runs on the caller's thread.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{load_config, DifferSettings, EnvironmentSpec, LoadedConfig};
use crate::git::{Checkout, GitStore, RepoAddress, RevSpec, Revision};
use crate::manifest::{self, load_tree, ManifestObject};
use crate::policy::RevisionPolicy;

use super::error::{DifferError, ResolutionError, Result};
use super::resolve::{git_failure, revision, ImageResolver};
use super::snapshot::{
    ClusterSnapshot, DifferState, EnvironmentSnapshot, ImageStatus, SnapshotPublisher,
    SnapshotReader,
};

/// Checkout link name of the config repository.
pub const CONFIG_CHECKOUT: &str = "config";

/// Revisions committed to an image's repository since a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ImageChanges {
    Resolved {
        image: String,
        repository: String,
        revision: String,
        revisions: Vec<Revision>,
    },
    Failed {
        image: String,
        error: ResolutionError,
    },
}

/// Compares two environments of a cluster on every cycle and publishes the
/// result.
pub struct ClusterDiffer {
    settings: DifferSettings,
    config_repo: RepoAddress,
    store: Arc<GitStore>,
    publisher: SnapshotPublisher,
    generation: AtomicU64,
    shutdown: AtomicBool,
}

impl ClusterDiffer {
    /// Creates a differ. Invalid settings are the only fatal error.
    pub fn new(settings: DifferSettings, store: Arc<GitStore>) -> Result<Self> {
        let config_repo = settings.validate().map_err(DifferError::Settings)?;

        Ok(Self {
            settings,
            config_repo,
            store,
            publisher: SnapshotPublisher::new(),
            generation: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &DifferSettings {
        &self.settings
    }

    pub fn store(&self) -> &GitStore {
        &self.store
    }

    pub fn reader(&self) -> SnapshotReader {
        self.publisher.reader()
    }

    pub fn current(&self) -> Option<Arc<ClusterSnapshot>> {
        self.publisher.current()
    }

    /// Interval until the next cycle: the config document's value once one
    /// has been loaded, the bootstrap setting before that.
    pub fn poll_interval(&self) -> Duration {
        self.current()
            .and_then(|snapshot| snapshot.poll_interval())
            .unwrap_or(self.settings.poll_interval)
    }

    /// Asks a running cycle to stop at its next checkpoint.
    pub fn request_stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stopped(&self) {
        self.publisher.update_status(|status| status.state = DifferState::Stopped);
    }

    /// Runs one cycle and publishes its snapshot.
    ///
    /// On failure the previous snapshot stays current and the status
    /// records the error. A cancelled cycle publishes nothing.
    pub fn reconcile(&self) -> Result<Arc<ClusterSnapshot>> {
        let generation = self.generation.load(Ordering::Acquire) + 1;
        let span = tracing::info_span!("reconcile", generation);
        let _entered = span.enter();

        let started = Utc::now();
        self.publisher.update_status(|status| {
            status.state = DifferState::Polling;
            status.last_attempt = Some(started);
        });

        match self.run_cycle(generation) {
            Ok(snapshot) => {
                let snapshot = self.publisher.publish(snapshot);
                self.generation.store(generation, Ordering::Release);
                self.publisher.update_status(|status| {
                    status.state = DifferState::Synced;
                    status.last_error = None;
                    status.last_success = Some(snapshot.completed_at);
                    status.generation = generation;
                });
                tracing::info!(
                    changed_objects = snapshot.diff.len(),
                    images = snapshot.images.len(),
                    "Published snapshot"
                );
                Ok(snapshot)
            }
            Err(DifferError::Cancelled) => {
                tracing::info!("Cycle cancelled, nothing published");
                self.mark_stopped();
                Err(DifferError::Cancelled)
            }
            Err(e) => {
                tracing::error!(error = %e, "Cycle failed, keeping previous snapshot");
                let message = e.to_string();
                self.publisher.update_status(|status| {
                    status.state = DifferState::SyncFailed;
                    status.last_error = Some(message);
                });
                Err(e)
            }
        }
    }

    fn checkpoint(&self) -> Result<()> {
        if self.is_stopping() {
            Err(DifferError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn run_cycle(&self, generation: u64) -> Result<ClusterSnapshot> {
        self.checkpoint()?;
        let config_mirror = self.store.sync_address(&self.config_repo)?;

        self.checkpoint()?;
        let config_checkout = self.store.ensure_checkout(
            &config_mirror,
            &self.settings.config_branch,
            &self.store.checkout_link(CONFIG_CHECKOUT),
        )?;
        tracing::debug!(revision = %config_checkout.hash, "Config checked out");

        self.checkpoint()?;

        let config_file = config_checkout.worktree.join(&self.settings.config_path);
        let loaded = Arc::new(load_config(&config_file).map_err(DifferError::Config)?);
        let environments = &loaded.config.spec.environments;

        self.checkpoint()?;
        let (source, source_objects) =
            self.load_environment(&environments.source, &config_checkout)?;
        self.checkpoint()?;
        let (target, target_objects) =
            self.load_environment(&environments.target, &config_checkout)?;

        let diff = manifest::diff(&source_objects, &target_objects);
        tracing::debug!(
            changed_objects = diff.len(),
            changed_images = diff.images().len(),
            "Computed manifest diff"
        );

        let mut resolver = ImageResolver::new(&self.store, &loaded);
        let mut images: BTreeMap<String, ImageStatus> = BTreeMap::new();
        for (object, change) in diff.entries() {
            if images.contains_key(change.image()) {
                continue;
            }
            self.checkpoint()?;
            let status = resolver.resolve(change);
            if let Some(error) = status.error() {
                tracing::warn!(%object, error = %error, "Image not resolved");
            }
            images.insert(change.image().to_string(), status);
        }
        self.checkpoint()?;

        Ok(ClusterSnapshot {
            generation,
            completed_at: Utc::now(),
            config_revision: config_checkout.hash,
            source,
            target,
            diff,
            images,
            config: loaded,
        })
    }

    /// Checks out and loads one environment's manifests.
    fn load_environment(
        &self,
        env: &EnvironmentSpec,
        config_checkout: &Checkout,
    ) -> Result<(EnvironmentSnapshot, Vec<ManifestObject>)> {
        let checkout = match &env.repository {
            Some(repository) => {
                let address = RepoAddress::parse(repository).map_err(|e| {
                    DifferError::Config(crate::config::ConfigError::Validation(format!(
                        "environment '{}': {}",
                        env.name, e
                    )))
                })?;
                let mirror = self.store.sync_address(&address)?;
                self.store.ensure_checkout(
                    &mirror,
                    env.branch_or_default(),
                    &self.store.checkout_link(&env.checkout_name()),
                )?
            }
            None => config_checkout.clone(),
        };

        let root = checkout.worktree.join(&env.path);
        let objects = load_tree(&root).map_err(|source| DifferError::Manifest {
            environment: env.name.clone(),
            source,
        })?;
        tracing::debug!(environment = %env.name, objects = objects.len(), "Loaded manifests");

        let snapshot = EnvironmentSnapshot {
            name: env.name.clone(),
            revision: checkout.hash,
            objects: objects.len(),
            images: manifest::image_set(&objects),
        };
        Ok((snapshot, objects))
    }

    /// Revisions committed since `since` to the source of every image
    /// deployed in `environment`.
    ///
    /// Only reads mirrors synced by earlier cycles. Images without a
    /// repository configuration are left out; other per-image failures are
    /// reported inline.
    pub fn changes_since(
        &self,
        environment: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ImageChanges>> {
        let snapshot = self.current().ok_or(DifferError::NoSnapshot)?;
        let env = snapshot
            .environment(environment)
            .ok_or_else(|| DifferError::UnknownEnvironment(environment.to_string()))?;
        let config = &snapshot.config;

        let mut changes = Vec::new();
        for (image, label) in &env.images {
            if !config.config.spec.images.contains_key(image) {
                continue;
            }
            let outcome = self
                .image_changes(config, image, label.as_deref(), environment, since)
                .map(|(repository, revision, revisions)| ImageChanges::Resolved {
                    image: image.clone(),
                    repository,
                    revision,
                    revisions,
                })
                .unwrap_or_else(|error| ImageChanges::Failed {
                    image: image.clone(),
                    error,
                });
            changes.push(outcome);
        }

        Ok(changes)
    }

    fn image_changes(
        &self,
        config: &LoadedConfig,
        image: &str,
        label: Option<&str>,
        environment: &str,
        since: DateTime<Utc>,
    ) -> std::result::Result<(String, String, Vec<Revision>), ResolutionError> {
        let spec = config
            .config
            .spec
            .images
            .get(image)
            .ok_or_else(|| ResolutionError::NoRepository {
                image: image.to_string(),
            })?;
        let address = RepoAddress::parse(&spec.repository).map_err(|e| ResolutionError::Config {
            image: image.to_string(),
            message: e.to_string(),
        })?;
        let policy = match &spec.policy {
            None => RevisionPolicy::Identity,
            Some(name) => config.policies.get(name).cloned().ok_or_else(|| {
                ResolutionError::UnknownPolicy {
                    image: image.to_string(),
                    policy: name.clone(),
                }
            })?,
        };
        let rev = revision(&policy, image, label, environment)?;

        let mirror = self.store.mirror_path(&address);
        if !mirror_exists(&mirror) {
            return Err(ResolutionError::Git {
                repository: address.canonical(),
                message: "repository has not been synced yet".to_string(),
            });
        }

        let revisions = self
            .store
            .log_since(&mirror, &RevSpec::new(rev.as_str()), since, &spec.paths)
            .map_err(|e| git_failure(&address, e))?;

        Ok((address.canonical(), rev, revisions))
    }
}

fn mirror_exists(path: &Path) -> bool {
    path.is_dir()
}
