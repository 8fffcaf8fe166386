//! The `DiffConfig` document read from the config repository.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::PolicySpec;

/// The API version of the config document.
pub const API_VERSION: &str = "envdiff.io/v1";

/// The only kind of document the differ reads.
pub const DIFF_CONFIG_KIND: &str = "DiffConfig";

/// Metadata for the document, following K8s conventions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
}

/// The whole config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffConfig {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: DiffConfigSpec,
}

impl DiffConfig {
    /// Creates a document with the current API version.
    pub fn new(name: impl Into<String>, spec: DiffConfigSpec) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: DIFF_CONFIG_KIND.to_string(),
            metadata: ObjectMeta { name: name.into() },
            spec,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffConfigSpec {
    /// Overrides the bootstrap poll interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,

    pub environments: Environments,

    /// Image name to the repository its source lives in.
    #[serde(default)]
    pub images: BTreeMap<String, ImageSpec>,

    /// Named revision policies referenced by images.
    #[serde(default)]
    pub policies: BTreeMap<String, PolicySpec>,
}

impl DiffConfigSpec {
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs.map(Duration::from_secs)
    }
}

/// The two environments being compared. `source` is the newer one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environments {
    pub source: EnvironmentSpec,
    pub target: EnvironmentSpec,
}

impl Environments {
    /// Finds an environment by name.
    pub fn get(&self, name: &str) -> Option<&EnvironmentSpec> {
        [&self.source, &self.target]
            .into_iter()
            .find(|env| env.name == name)
    }
}

/// Where an environment's manifests live.
///
/// Without `repository` the path is relative to the config checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl EnvironmentSpec {
    /// Name of the checkout link for environments with their own repository.
    pub fn checkout_name(&self) -> String {
        format!("env-{}", self.name)
    }

    /// Branch to check out, `master` when not given.
    pub fn branch_or_default(&self) -> &str {
        self.branch.as_deref().unwrap_or(super::DEFAULT_BRANCH)
    }
}

/// Where an image's source code lives and how its tags map to revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    pub repository: String,

    /// Policy name; tags are used verbatim when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,

    /// Restricts revision logs to these paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}
