//! Resolves changed images to source revision ranges.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::{ImageSpec, LoadedConfig};
use crate::git::{GitStore, RepoAddress, RevSpec};
use crate::manifest::ImageDiff;
use crate::policy::RevisionPolicy;

use super::error::ResolutionError;
use super::snapshot::ImageStatus;

type MirrorResult = std::result::Result<PathBuf, ResolutionError>;

/// Per-cycle image resolution.
///
/// Each image repository is synced at most once per resolver; a failed sync
/// is remembered and reported for every image that shares the repository.
pub struct ImageResolver<'a> {
    store: &'a GitStore,
    config: &'a LoadedConfig,
    source: &'a str,
    target: &'a str,
    mirrors: HashMap<RepoAddress, MirrorResult>,
}

impl<'a> ImageResolver<'a> {
    pub fn new(store: &'a GitStore, config: &'a LoadedConfig) -> Self {
        let environments = &config.config.spec.environments;
        Self {
            store,
            config,
            source: &environments.source.name,
            target: &environments.target.name,
            mirrors: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, change: &ImageDiff) -> ImageStatus {
        self.try_resolve(change).unwrap_or_else(ImageStatus::from)
    }

    fn try_resolve(&mut self, change: &ImageDiff) -> Result<ImageStatus, ResolutionError> {
        let image = change.image();
        let spec = self.image_spec(image)?;
        let address = RepoAddress::parse(&spec.repository).map_err(|e| ResolutionError::Config {
            image: image.to_string(),
            message: e.to_string(),
        })?;
        let policy = self.policy(image, spec)?;

        match change {
            ImageDiff::Changed { old, new, .. } => {
                let old_rev = revision(&policy, image, old.as_deref(), self.target)?;
                let new_rev = revision(&policy, image, new.as_deref(), self.source)?;
                let mirror = self.mirror(&address)?;

                let (start, end) = (RevSpec::new(old_rev), RevSpec::new(new_rev));
                let revisions = self
                    .store
                    .log_filtered(&mirror, &start, &end, &spec.paths)
                    .map_err(|e| git_failure(&address, e))?;

                Ok(ImageStatus::Resolved {
                    repository: address.canonical(),
                    range: RevSpec::range(&start, &end),
                    revisions,
                })
            }
            ImageDiff::Added { label, .. } | ImageDiff::Removed { label, .. } => {
                let environment = match change {
                    ImageDiff::Added { .. } => self.source,
                    _ => self.target,
                };
                let revision = revision(&policy, image, label.as_deref(), environment)?;
                self.mirror(&address)?;

                Ok(ImageStatus::Unpaired {
                    repository: address.canonical(),
                    environment: environment.to_string(),
                    revision,
                })
            }
        }
    }

    fn image_spec(&self, image: &str) -> Result<&'a ImageSpec, ResolutionError> {
        self.config
            .config
            .spec
            .images
            .get(image)
            .ok_or_else(|| ResolutionError::NoRepository {
                image: image.to_string(),
            })
    }

    fn policy(&self, image: &str, spec: &ImageSpec) -> Result<RevisionPolicy, ResolutionError> {
        match &spec.policy {
            None => Ok(RevisionPolicy::Identity),
            Some(name) => self.config.policies.get(name).cloned().ok_or_else(|| {
                ResolutionError::UnknownPolicy {
                    image: image.to_string(),
                    policy: name.clone(),
                }
            }),
        }
    }

    fn mirror(&mut self, address: &RepoAddress) -> MirrorResult {
        let store = self.store;
        self.mirrors
            .entry(address.clone())
            .or_insert_with(|| {
                store.sync_address(address).map_err(|e| {
                    tracing::warn!(repository = %address, error = %e, "Image repository sync failed");
                    git_failure(address, e)
                })
            })
            .clone()
    }
}

/// Maps a tag through a policy.
pub(crate) fn revision(
    policy: &RevisionPolicy,
    image: &str,
    tag: Option<&str>,
    environment: &str,
) -> Result<String, ResolutionError> {
    let tag = tag.ok_or_else(|| ResolutionError::MissingTag {
        image: image.to_string(),
        environment: environment.to_string(),
    })?;
    policy.apply(tag).map_err(|e| ResolutionError::Policy {
        image: image.to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn git_failure(address: &RepoAddress, error: crate::git::GitError) -> ResolutionError {
    ResolutionError::Git {
        repository: address.canonical(),
        message: error.to_string(),
    }
}
