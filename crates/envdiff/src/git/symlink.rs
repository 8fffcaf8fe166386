//! Atomic repointing of checkout links.
//!
//! A link is replaced by creating a fresh symlink under a temporary name in
//! the same directory and renaming it over the old one. Rename within one
//! directory is atomic, so a concurrent reader sees either the old target or
//! the new one.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use super::error::{GitError, Result};

/// What happened to a link during [`swap_link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The link already pointed at the requested target.
    Unchanged,
    /// The link was created or repointed.
    Swapped { previous: Option<PathBuf> },
}

/// Points `link` at `target`, replacing any existing link atomically.
///
/// The stored target is relative to the link's directory. `previous` is the
/// old target resolved against that directory.
pub fn swap_link(link: &Path, target: &Path) -> Result<SwapOutcome> {
    let link_dir = link
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let link_name = link
        .file_name()
        .ok_or_else(|| {
            GitError::filesystem(
                link,
                io::Error::new(io::ErrorKind::InvalidInput, "link path has no file name"),
            )
        })?
        .to_string_lossy()
        .into_owned();

    fs::create_dir_all(link_dir).map_err(|e| GitError::filesystem(link_dir, e))?;

    let relative_target = relative_path(link_dir, target);

    let previous = match fs::read_link(link) {
        Ok(existing) if existing == relative_target => return Ok(SwapOutcome::Unchanged),
        Ok(existing) => Some(normalize(&link_dir.join(existing))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            log::debug!("Existing {:?} is not a readable symlink: {}", link, e);
            None
        }
    };

    let temp_link = link_dir.join(format!(".{}.{}", link_name, Uuid::new_v4().simple()));
    create_symlink(&relative_target, &temp_link)?;

    if let Err(e) = fs::rename(&temp_link, link) {
        if let Err(cleanup) = fs::remove_file(&temp_link) {
            log::warn!(
                "Failed to remove temporary link {:?}: {}",
                temp_link,
                cleanup
            );
        }
        return Err(GitError::filesystem(link, e));
    }

    Ok(SwapOutcome::Swapped { previous })
}

/// Resolves the current target of `link` against its directory.
pub fn read_target(link: &Path) -> Option<PathBuf> {
    let target = fs::read_link(link).ok()?;
    let link_dir = link.parent().unwrap_or(Path::new("."));
    Some(normalize(&link_dir.join(target)))
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| GitError::filesystem(link, e))
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_dir(target, link).map_err(|e| GitError::filesystem(link, e))
}

/// Computes the path of `to` relative to the directory `from_dir`.
pub fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from_canonical = absolutize(from_dir);
    let to_canonical = absolutize(to);

    let from_components: Vec<_> = from_canonical.components().collect();
    let to_components: Vec<_> = to_canonical.components().collect();

    let common_length = from_components
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common_length..from_components.len() {
        relative.push("..");
    }
    for component in &to_components[common_length..] {
        relative.push(component);
    }

    if relative.as_os_str().is_empty() {
        relative.push(Component::CurDir);
    }

    relative
}

/// Drops `.` components and folds `..` into the preceding component without
/// touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

/// Absolute, normalized form of `path`. The deepest existing ancestor is
/// canonicalized so a path that no longer exists still compares equal to
/// the same location spelled through symlinked parents.
fn absolutize(path: &Path) -> PathBuf {
    let absolute = normalize(&std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()));

    for ancestor in absolute.ancestors() {
        let Ok(canonical) = ancestor.canonicalize() else {
            continue;
        };
        return match absolute.strip_prefix(ancestor) {
            Ok(rest) if !rest.as_os_str().is_empty() => canonical.join(rest),
            _ => canonical,
        };
    }

    absolute
}

/// Returns true if two paths name the same filesystem location.
pub fn same_location(a: &Path, b: &Path) -> bool {
    absolutize(a) == absolutize(b)
}
