//! Image sets and per-object image diffs between two environments.
//!
//! The source environment is the "new" side and the target environment the
//! "old" one: an image only in source is `Added`, only in target is
//! `Removed`, and `Changed` carries the target label first.

use std::collections::{BTreeMap, BTreeSet};

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use super::object::{ManifestObject, ObjectId};

/// Image name to tag/digest across a whole environment.
pub type ImageSet = BTreeMap<String, Option<String>>;

/// How one image declaration differs between environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImageDiff {
    /// Declared in source only.
    Added { image: String, label: Option<String> },
    /// Declared in target only.
    Removed { image: String, label: Option<String> },
    /// Declared in both with different labels.
    Changed {
        image: String,
        old: Option<String>,
        new: Option<String>,
    },
}

impl ImageDiff {
    /// Name of the image this entry is about.
    pub fn image(&self) -> &str {
        match self {
            ImageDiff::Added { image, .. }
            | ImageDiff::Removed { image, .. }
            | ImageDiff::Changed { image, .. } => image,
        }
    }
}

/// Image diffs keyed by object identity. Objects without differences are
/// never present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff(BTreeMap<ObjectId, Vec<ImageDiff>>);

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, id: &ObjectId) -> Option<&[ImageDiff]> {
        self.0.get(id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &[ImageDiff])> {
        self.0.iter().map(|(id, diffs)| (id, diffs.as_slice()))
    }

    /// Every entry, in object identity order.
    pub fn entries(&self) -> impl Iterator<Item = (&ObjectId, &ImageDiff)> {
        self.0
            .iter()
            .flat_map(|(id, diffs)| diffs.iter().map(move |d| (id, d)))
    }

    /// Distinct image names that appear anywhere in the diff.
    pub fn images(&self) -> BTreeSet<&str> {
        self.entries().map(|(_, d)| d.image()).collect()
    }
}

#[derive(Serialize)]
struct ObjectDiffRef<'a> {
    object: &'a ObjectId,
    changes: &'a [ImageDiff],
}

impl Serialize for ManifestDiff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for (object, changes) in &self.0 {
            seq.serialize_element(&ObjectDiffRef { object, changes })?;
        }
        seq.end()
    }
}

/// Folds the images of all objects into one set.
///
/// When an image name is declared more than once, the first declaration in
/// `objects` order wins.
pub fn image_set(objects: &[ManifestObject]) -> ImageSet {
    let mut set = ImageSet::new();
    for image in objects.iter().flat_map(|o| o.images.iter()) {
        set.entry(image.name.clone())
            .or_insert_with(|| image.label.clone());
    }
    set
}

type ObjectImages<'a> = BTreeMap<&'a ObjectId, BTreeMap<&'a str, &'a Option<String>>>;

/// Groups objects by identity. Duplicate identities are merged and
/// duplicate image names keep their first label.
fn index(objects: &[ManifestObject]) -> ObjectImages<'_> {
    let mut by_id: ObjectImages<'_> = BTreeMap::new();
    for object in objects {
        let images = by_id.entry(&object.id).or_default();
        for image in &object.images {
            images.entry(image.name.as_str()).or_insert(&image.label);
        }
    }
    by_id
}

/// Compares the images declared by two environments, object by object.
pub fn diff(source: &[ManifestObject], target: &[ManifestObject]) -> ManifestDiff {
    let source = index(source);
    let target = index(target);

    let ids: BTreeSet<&ObjectId> = source.keys().chain(target.keys()).copied().collect();
    let empty = BTreeMap::new();

    let mut result = BTreeMap::new();
    for id in ids {
        let new = source.get(id).unwrap_or(&empty);
        let old = target.get(id).unwrap_or(&empty);

        let names: BTreeSet<&str> = new.keys().chain(old.keys()).copied().collect();
        let diffs: Vec<ImageDiff> = names
            .into_iter()
            .filter_map(|name| match (new.get(name), old.get(name)) {
                (Some(&new_label), Some(&old_label)) if new_label != old_label => {
                    Some(ImageDiff::Changed {
                        image: name.to_string(),
                        old: old_label.clone(),
                        new: new_label.clone(),
                    })
                }
                (Some(&label), None) => Some(ImageDiff::Added {
                    image: name.to_string(),
                    label: label.clone(),
                }),
                (None, Some(&label)) => Some(ImageDiff::Removed {
                    image: name.to_string(),
                    label: label.clone(),
                }),
                _ => None,
            })
            .collect();

        if !diffs.is_empty() {
            result.insert(id.clone(), diffs);
        }
    }

    ManifestDiff(result)
}
