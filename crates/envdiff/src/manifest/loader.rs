//! Loads every manifest below a directory.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use super::error::{ManifestError, Result};
use super::object::{parse, ManifestObject};

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Loads all workload objects below `root`, sorted by identity.
///
/// Hidden files and directories are ignored. A file that cannot be read or
/// parsed is logged and skipped so one bad manifest does not hide the rest
/// of the environment.
pub fn load_tree(root: &Path) -> Result<Vec<ManifestObject>> {
    if !root.is_dir() {
        return Err(ManifestError::RootNotFound(root.to_path_buf()));
    }

    let mut objects = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(ManifestError::Walk {
                    path: root.to_path_buf(),
                    message: e.to_string(),
                })
            }
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !has_manifest_extension(path) {
            continue;
        }

        match load_file(path) {
            Ok(mut found) => {
                log::trace!("Loaded {} object(s) from {}", found.len(), path.display());
                objects.append(&mut found);
            }
            Err(e) => log::warn!("Skipping manifest {}: {}", path.display(), e),
        }
    }

    // stable, so containers keep document order within duplicated identities
    objects.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(objects)
}

/// Parses a single manifest file.
pub fn load_file(path: &Path) -> Result<Vec<ManifestObject>> {
    let content = fs::read_to_string(path).map_err(|e| ManifestError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse(&content).map_err(|e| e.with_path(path))
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

fn has_manifest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| MANIFEST_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::object::{Image, ObjectId};
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    fn deployment(namespace: &str, name: &str, image: &str) -> String {
        format!(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {}\n  namespace: {}\nspec:\n  template:\n    spec:\n      containers:\n      - image: {}\n",
            name, namespace, image
        )
    }

    #[test]
    fn test_load_tree_sorted_by_identity() {
        let temp = TempDir::new().unwrap();
        temp.child("querier.yaml")
            .write_str(&deployment("cortex", "querier", "cortex-querier:1"))
            .unwrap();
        temp.child("nested/ruler.yml")
            .write_str(&deployment("cortex", "ruler", "cortex-ruler:2"))
            .unwrap();
        temp.child("alerts.yaml")
            .write_str(&deployment("cortex", "alertmanager", "alertmanager:3"))
            .unwrap();

        let objects = load_tree(temp.path()).unwrap();
        let names: Vec<_> = objects.iter().map(|o| o.id.name.as_str()).collect();

        assert_eq!(names, vec!["alertmanager", "querier", "ruler"]);
        assert_eq!(objects[2].images, vec![Image::new("cortex-ruler", Some("2"))]);
    }

    #[test]
    fn test_load_tree_skips_hidden_and_foreign_files() {
        let temp = TempDir::new().unwrap();
        temp.child(".git/config.yaml")
            .write_str(&deployment("cortex", "hidden-dir", "x:1"))
            .unwrap();
        temp.child(".draft.yaml")
            .write_str(&deployment("cortex", "hidden-file", "x:1"))
            .unwrap();
        temp.child("README.md")
            .write_str(&deployment("cortex", "markdown", "x:1"))
            .unwrap();
        temp.child("ruler.yaml")
            .write_str(&deployment("cortex", "ruler", "x:1"))
            .unwrap();

        let objects = load_tree(temp.path()).unwrap();

        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].id, ObjectId::new("cortex", "ruler", "Deployment"));
    }

    #[test]
    fn test_load_tree_skips_unparsable_files() {
        let temp = TempDir::new().unwrap();
        temp.child("broken.yaml")
            .write_str("kind: Deployment\nmetadata: [unclosed\n")
            .unwrap();
        temp.child("ruler.yaml")
            .write_str(&deployment("cortex", "ruler", "x:1"))
            .unwrap();

        let objects = load_tree(temp.path()).unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn test_load_tree_reads_json() {
        let temp = TempDir::new().unwrap();
        temp.child("pod.json")
            .write_str(r#"{"kind": "Pod", "metadata": {"name": "debug"}, "spec": {"containers": [{"image": "busybox:1.36"}]}}"#)
            .unwrap();

        let objects = load_tree(temp.path()).unwrap();
        assert_eq!(objects[0].id, ObjectId::new("default", "debug", "Pod"));
    }

    #[test]
    fn test_load_tree_missing_root() {
        let temp = TempDir::new().unwrap();
        let result = load_tree(&temp.path().join("missing"));
        assert!(matches!(result, Err(ManifestError::RootNotFound(_))));
    }

    #[test]
    fn test_load_tree_empty_directory() {
        let temp = TempDir::new().unwrap();
        assert!(load_tree(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_load_file_attaches_path() {
        let temp = TempDir::new().unwrap();
        let file = temp.child("broken.yaml");
        file.write_str("kind: Deployment\nmetadata: [unclosed\n").unwrap();

        match load_file(file.path()) {
            Err(ManifestError::ParseYaml { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
