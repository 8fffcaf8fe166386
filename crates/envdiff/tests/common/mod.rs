//! Shared helpers for envdiff integration tests.
//!
//! `RemoteRepo` is a plain working repository on disk that stands in for a
//! remote; tests commit to it and point the store at its `file://` URL.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use url::Url;

use envdiff::RepoAddress;

/// Runs git in `dir` with a fixed identity and no user configuration.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=master"])
        .args(args)
        .env("GIT_AUTHOR_NAME", "Test Author")
        .env("GIT_AUTHOR_EMAIL", "author@example.com")
        .env("GIT_COMMITTER_NAME", "Test Author")
        .env("GIT_COMMITTER_EMAIL", "author@example.com")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .expect("failed to run git");

    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A repository acting as a remote.
pub struct RemoteRepo {
    _dir: TempDir,
    pub path: PathBuf,
}

impl RemoteRepo {
    pub fn new(name: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join(name);
        fs::create_dir_all(&path).expect("Failed to create repository directory");

        git(&path, &["init", "--quiet"]);
        git(&path, &["symbolic-ref", "HEAD", "refs/heads/master"]);

        Self { _dir: dir, path }
    }

    pub fn address(&self) -> RepoAddress {
        let url = Url::from_file_path(&self.path).expect("absolute repository path");
        RepoAddress::parse(url.as_str()).expect("file URL is a valid address")
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(path, content).expect("Failed to write file");
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.path.join(relative)).expect("Failed to remove file");
    }

    /// Commits everything in the working tree and returns the new hash.
    pub fn commit(&self, subject: &str) -> String {
        git(&self.path, &["add", "--all"]);
        git(&self.path, &["commit", "--quiet", "--allow-empty", "-m", subject]);
        self.head()
    }

    pub fn head(&self) -> String {
        git(&self.path, &["rev-parse", "HEAD"])
    }

    pub fn create_branch(&self, name: &str) {
        git(&self.path, &["branch", name]);
    }
}

/// A Deployment manifest with one container per image.
pub fn deployment(namespace: &str, name: &str, images: &[&str]) -> String {
    let containers: String = images
        .iter()
        .map(|image| format!("      - image: {}\n", image))
        .collect();
    format!(
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {}\n  namespace: {}\nspec:\n  template:\n    spec:\n      containers:\n{}",
        name, namespace, containers
    )
}
