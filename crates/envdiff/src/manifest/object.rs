//! Normalized deployment objects and their declared images.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::error::{ManifestError, Result};

/// Namespace assumed for objects that do not declare one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity of a deployed object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectId {
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

impl ObjectId {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

/// A container image reference split into repository name and tag or digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Repository name including registry, e.g. `quay.io/weaveworks/cortex-ruler`.
    pub name: String,
    /// Tag or digest, e.g. `master-f7f6cf9e` or `sha256:...`.
    pub label: Option<String>,
}

impl Image {
    pub fn new(name: impl Into<String>, label: Option<&str>) -> Self {
        Self {
            name: name.into(),
            label: label.map(str::to_string),
        }
    }

    /// Splits an image reference.
    ///
    /// A digest wins over a tag. A colon before the last `/` belongs to the
    /// registry host (`registry:5000/app`) and is not a tag separator.
    pub fn parse(reference: &str) -> Self {
        let reference = reference.trim();

        if let Some((name, digest)) = reference.split_once('@') {
            let name = Self::parse(name).name;
            return Self::new(name, Some(digest).filter(|d| !d.is_empty()));
        }

        let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
        match reference[name_start..].rfind(':') {
            Some(i) => {
                let split = name_start + i;
                let tag = &reference[split + 1..];
                Self::new(&reference[..split], Some(tag).filter(|t| !t.is_empty()))
            }
            None => Self::new(reference, None),
        }
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) if label.contains(':') => write!(f, "{}@{}", self.name, label),
            Some(label) => write!(f, "{}:{}", self.name, label),
            None => f.write_str(&self.name),
        }
    }
}

/// A deployed object and the images it declares, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestObject {
    pub id: ObjectId,
    pub images: Vec<Image>,
}

/// Where a workload kind keeps its pod spec.
fn pod_spec_path(kind: &str) -> Option<&'static [&'static str]> {
    match kind {
        "Pod" => Some(&["spec"]),
        "Deployment" | "DaemonSet" | "StatefulSet" | "ReplicaSet" | "ReplicationController"
        | "Job" => Some(&["spec", "template", "spec"]),
        "CronJob" => Some(&["spec", "jobTemplate", "spec", "template", "spec"]),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodSpec {
    #[serde(default)]
    init_containers: Vec<Container>,
    #[serde(default)]
    containers: Vec<Container>,
}

#[derive(Debug, Deserialize)]
struct Container {
    #[serde(default)]
    image: Option<String>,
}

/// Parses every document in a (possibly multi-document) manifest stream.
///
/// Documents of unrecognised kinds are skipped, as are recognised documents
/// that lack a name. Only YAML syntax errors fail the whole stream.
pub fn parse(text: &str) -> Result<Vec<ManifestObject>> {
    let mut objects = Vec::new();

    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)?;
        collect_objects(value, &mut objects);
    }

    Ok(objects)
}

/// Parses a single manifest document.
///
/// Returns `Ok(None)` for documents that are not workloads.
pub fn parse_object(text: &str) -> Result<Option<ManifestObject>> {
    let value: Value = serde_yaml::from_str(text)?;
    object_from_value(&value).map_err(|message| ManifestError::InvalidManifest {
        path: Default::default(),
        message,
    })
}

fn collect_objects(value: Value, objects: &mut Vec<ManifestObject>) {
    if value.is_null() {
        return;
    }

    if value.get("kind").and_then(Value::as_str) == Some("List") {
        if let Some(items) = value.get("items").and_then(Value::as_sequence) {
            for item in items {
                collect_objects(item.clone(), objects);
            }
        }
        return;
    }

    match object_from_value(&value) {
        Ok(Some(object)) => objects.push(object),
        Ok(None) => {}
        Err(message) => log::warn!("Skipping manifest document: {}", message),
    }
}

fn object_from_value(value: &Value) -> std::result::Result<Option<ManifestObject>, String> {
    let header: Header = match serde_yaml::from_value(value.clone()) {
        Ok(header) => header,
        // not a mapping at all, e.g. a bare scalar document
        Err(_) => return Ok(None),
    };

    let Some(kind) = header.kind else {
        return Ok(None);
    };
    let Some(path) = pod_spec_path(&kind) else {
        return Ok(None);
    };

    let metadata = header
        .metadata
        .ok_or_else(|| format!("{} without metadata", kind))?;
    let name = metadata
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| format!("{} without metadata.name", kind))?;
    let namespace = metadata
        .namespace
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let pod_spec = match lookup(value, path) {
        Some(spec) => serde_yaml::from_value::<PodSpec>(spec.clone())
            .map_err(|e| format!("{} {}/{}: invalid pod spec: {}", kind, namespace, name, e))?,
        None => PodSpec::default(),
    };

    let images = pod_spec
        .init_containers
        .iter()
        .chain(pod_spec.containers.iter())
        .filter_map(|c| c.image.as_deref())
        .filter(|image| !image.trim().is_empty())
        .map(Image::parse)
        .collect();

    Ok(Some(ManifestObject {
        id: ObjectId::new(namespace, name, kind),
        images,
    }))
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}
