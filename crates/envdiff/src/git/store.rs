//! Local mirrors and worktree checkouts.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/repos/<sha256(address)>-<name>            bare mirror
//! <root>/repos/<sha256(address)>-<name>/rev-<hash> worktree of one commit
//! <root>/checkouts/<link>                          symlink to a worktree
//! ```
//!
//! The store assumes it is the only writer below its root. Mutating calls
//! (`sync`, `ensure_checkout`) must not run concurrently for the same mirror.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::address::RepoAddress;
use super::error::{is_unknown_revision, GitError, Result};
use super::parse::{first_line, parse_log, LOG_FORMAT};
use super::runner::{GitRunner, SystemGit};
use super::symlink::{read_target, same_location, swap_link, SwapOutcome};
use super::types::{Checkout, Hash, RevSpec, Revision, SyncKind};

const REPOS_DIR: &str = "repos";
const CHECKOUTS_DIR: &str = "checkouts";
const WORKTREE_PREFIX: &str = "rev-";

/// Owns the on-disk mirrors and checkouts below one root directory.
pub struct GitStore {
    root: PathBuf,
    runner: Arc<dyn GitRunner>,
    /// Live checkout links and the worktree each one points at.
    links: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl GitStore {
    /// Creates a store rooted at `root` that runs git through `runner`.
    /// A relative `root` is resolved against the current directory.
    pub fn new(root: impl Into<PathBuf>, runner: Arc<dyn GitRunner>) -> Self {
        let root = root.into();
        Self {
            root: std::path::absolute(&root).unwrap_or(root),
            runner,
            links: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a store that runs the system `git` binary.
    pub fn system(root: impl Into<PathBuf>) -> Self {
        Self::new(root, Arc::new(SystemGit::default()))
    }

    /// Returns the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic mirror location for `address`.
    pub fn mirror_path(&self, address: &RepoAddress) -> PathBuf {
        self.root.join(REPOS_DIR).join(address.storage_name())
    }

    /// Location of a named checkout link below the store root.
    pub fn checkout_link(&self, name: &str) -> PathBuf {
        self.root.join(CHECKOUTS_DIR).join(name)
    }

    /// Worktree location for one commit of a mirror.
    pub fn worktree_path(mirror: &Path, hash: &Hash) -> PathBuf {
        mirror.join(format!("{}{}", WORKTREE_PREFIX, hash))
    }

    /// Clones `address` as a bare mirror at `local_path`, or fetches all refs
    /// (pruning deleted branches) if the mirror already exists.
    pub fn sync(&self, address: &RepoAddress, local_path: &Path) -> Result<SyncKind> {
        if local_path.exists() {
            log::debug!("Fetching {} into {}", address, local_path.display());
            self.runner
                .run(&["fetch", "--all", "--prune"], Some(local_path))?;
            return Ok(SyncKind::Fetched);
        }

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).map_err(|e| GitError::filesystem(parent, e))?;
        }

        log::info!("Cloning {} into {}", address, local_path.display());
        let canonical = address.canonical();
        let target = local_path.to_string_lossy();
        self.runner
            .run(&["clone", "--mirror", &canonical, &target], None)?;

        Ok(SyncKind::Cloned)
    }

    /// Syncs the mirror for `address` at its deterministic location and
    /// returns that location.
    pub fn sync_address(&self, address: &RepoAddress) -> Result<PathBuf> {
        let mirror = self.mirror_path(address);
        self.sync(address, &mirror)?;
        Ok(mirror)
    }

    /// Returns the commit at the tip of `branch` in the mirror.
    ///
    /// A branch that does not exist is reported as [`GitError::RefNotFound`];
    /// any other failure is passed through unchanged.
    pub fn resolve_branch_head(&self, mirror: &Path, branch: &str) -> Result<Hash> {
        let not_found = || GitError::RefNotFound {
            reference: branch.to_string(),
            mirror: mirror.to_path_buf(),
        };

        let output = match self
            .runner
            .run(&["rev-list", "-n1", branch, "--"], Some(mirror))
        {
            Ok(output) => output,
            Err(GitError::Process { ref stderr, .. }) if is_unknown_revision(stderr) => {
                return Err(not_found());
            }
            Err(e) => return Err(e),
        };

        first_line(&output.stdout)
            .map(Hash::new)
            .ok_or_else(not_found)
    }

    /// Makes `link` point at a worktree of the current head of `branch`.
    ///
    /// The worktree for a commit is created once and reused; the link is
    /// swapped atomically; the worktree the link used to point at is removed
    /// unless another live link still uses it.
    pub fn ensure_checkout(&self, mirror: &Path, branch: &str, link: &Path) -> Result<Checkout> {
        let mirror: &Path =
            &std::path::absolute(mirror).map_err(|e| GitError::filesystem(mirror, e))?;
        let hash = self.resolve_branch_head(mirror, branch)?;
        let worktree = Self::worktree_path(mirror, &hash);

        let created = if is_worktree(&worktree) {
            false
        } else {
            if worktree.exists() {
                log::warn!("Discarding incomplete worktree {}", worktree.display());
                fs::remove_dir_all(&worktree).map_err(|e| GitError::filesystem(&worktree, e))?;
                self.runner.run(&["worktree", "prune"], Some(mirror))?;
            }
            log::info!(
                "Adding worktree for {}@{} at {}",
                branch,
                hash,
                worktree.display()
            );
            let path = worktree.to_string_lossy();
            self.runner.run(
                &["worktree", "add", "--detach", &path, hash.as_str()],
                Some(mirror),
            )?;
            true
        };

        let previous = match swap_link(link, &worktree)? {
            SwapOutcome::Unchanged => None,
            SwapOutcome::Swapped { previous } => previous,
        };

        let mut links = self.links.lock().unwrap_or_else(|e| e.into_inner());
        links.insert(link.to_path_buf(), worktree.clone());

        if let Some(old) = previous.as_deref() {
            let still_used = links.values().any(|w| same_location(w, old))
                || self.linked_on_disk(old, link);
            if !same_location(old, &worktree) && !still_used {
                self.remove_worktree(old, mirror)?;
            }
        }

        Ok(Checkout {
            hash,
            worktree,
            link: link.to_path_buf(),
            created,
            previous,
        })
    }

    /// Whether a link in the checkouts directory other than `except` points
    /// at `worktree`. Covers links left by an earlier process.
    fn linked_on_disk(&self, worktree: &Path, except: &Path) -> bool {
        let Ok(entries) = fs::read_dir(self.root.join(CHECKOUTS_DIR)) else {
            return false;
        };
        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path != except)
            .filter_map(|path| read_target(&path))
            .any(|target| same_location(&target, worktree))
    }

    fn remove_worktree(&self, worktree: &Path, fallback_mirror: &Path) -> Result<()> {
        log::info!("Removing stale worktree {}", worktree.display());

        match fs::remove_dir_all(worktree) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(GitError::filesystem(worktree, e)),
        }

        // The old worktree may belong to another mirror if the link changed
        // repositories; prune where it lived.
        let owner = worktree
            .parent()
            .filter(|p| p.exists())
            .unwrap_or(fallback_mirror);
        self.runner.run(&["worktree", "prune"], Some(owner))?;

        Ok(())
    }

    /// First-parent log of `start..end`, newest first.
    pub fn log(&self, mirror: &Path, start: &RevSpec, end: &RevSpec) -> Result<Vec<Revision>> {
        self.log_filtered(mirror, start, end, &[])
    }

    /// First-parent log of `start..end` restricted to commits touching
    /// `paths`. An empty `paths` means the whole tree.
    pub fn log_filtered(
        &self,
        mirror: &Path,
        start: &RevSpec,
        end: &RevSpec,
        paths: &[String],
    ) -> Result<Vec<Revision>> {
        let range = RevSpec::range(start, end);

        let mut args = vec!["log", "--first-parent", LOG_FORMAT, range.as_str(), "--"];
        args.extend(paths.iter().map(String::as_str));

        let output = self.runner.run(&args, Some(mirror))?;
        Ok(parse_log(&output.stdout))
    }

    /// First-parent log of everything reachable from `rev` committed after
    /// `since`, newest first.
    pub fn log_since(
        &self,
        mirror: &Path,
        rev: &RevSpec,
        since: DateTime<Utc>,
        paths: &[String],
    ) -> Result<Vec<Revision>> {
        let since_arg = format!("--since={}", since.format("%Y-%m-%d %H:%M:%S +0000"));

        let mut args = vec![
            "log",
            "--first-parent",
            LOG_FORMAT,
            since_arg.as_str(),
            rev.as_str(),
            "--",
        ];
        args.extend(paths.iter().map(String::as_str));

        let output = self.runner.run(&args, Some(mirror))?;
        Ok(parse_log(&output.stdout))
    }
}

/// A finished `git worktree add` leaves a `.git` file in the worktree.
fn is_worktree(path: &Path) -> bool {
    path.join(".git").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::runner::GitOutput;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Scripted runner that records every invocation.
    #[derive(Default)]
    struct FakeGit {
        calls: Mutex<Vec<(Vec<String>, Option<PathBuf>)>>,
        responses: Mutex<VecDeque<Result<GitOutput>>>,
    }

    impl FakeGit {
        fn respond(&self, response: Result<GitOutput>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn respond_stdout(&self, stdout: &str) {
            self.respond(Ok(GitOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
            }));
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(args, _)| args.clone())
                .collect()
        }
    }

    impl GitRunner for FakeGit {
        fn run(&self, args: &[&str], cwd: Option<&Path>) -> Result<GitOutput> {
            self.calls.lock().unwrap().push((
                args.iter().map(|a| a.to_string()).collect(),
                cwd.map(Path::to_path_buf),
            ));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(GitOutput::default()))
        }
    }

    fn setup() -> (TempDir, Arc<FakeGit>, GitStore) {
        let dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeGit::default());
        let store = GitStore::new(dir.path(), fake.clone());
        (dir, fake, store)
    }

    /// Lays out a directory the way `git worktree add` leaves it.
    fn fake_worktree(path: &Path) {
        fs::create_dir_all(path).unwrap();
        fs::write(path.join(".git"), "gitdir: ../worktrees/x\n").unwrap();
    }

    fn process_error(stderr: &str) -> GitError {
        GitError::Process {
            command: "git rev-list -n1 nope --".to_string(),
            exit_code: Some(128),
            stdout: String::new(),
            stderr: stderr.to_string(),
            cwd: None,
        }
    }

    #[test]
    fn test_mirror_path_layout() {
        let (dir, _fake, store) = setup();
        let address = RepoAddress::parse("git@github.com:weaveworks/cortex.git").unwrap();

        let mirror = store.mirror_path(&address);
        assert_eq!(mirror.parent().unwrap(), dir.path().join("repos"));
        assert_eq!(
            mirror.file_name().unwrap().to_string_lossy(),
            address.storage_name()
        );
    }

    #[test]
    fn test_sync_clones_when_missing() {
        let (dir, fake, store) = setup();
        let address = RepoAddress::parse("git@github.com:weaveworks/cortex").unwrap();
        let mirror = store.mirror_path(&address);

        let kind = store.sync(&address, &mirror).unwrap();

        assert_eq!(kind, SyncKind::Cloned);
        assert!(dir.path().join("repos").is_dir());
        assert_eq!(
            fake.calls(),
            vec![vec![
                "clone".to_string(),
                "--mirror".to_string(),
                "git@github.com:weaveworks/cortex".to_string(),
                mirror.to_string_lossy().into_owned(),
            ]]
        );
    }

    #[test]
    fn test_sync_fetches_when_present() {
        let (_dir, fake, store) = setup();
        let address = RepoAddress::parse("git@github.com:weaveworks/cortex").unwrap();
        let mirror = store.mirror_path(&address);
        fs::create_dir_all(&mirror).unwrap();

        let kind = store.sync(&address, &mirror).unwrap();

        assert_eq!(kind, SyncKind::Fetched);
        assert_eq!(fake.calls(), vec![vec!["fetch", "--all", "--prune"]]);
        let (_, cwd) = fake.calls.lock().unwrap()[0].clone();
        assert_eq!(cwd, Some(mirror));
    }

    #[test]
    fn test_sync_propagates_tool_failure() {
        let (_dir, fake, store) = setup();
        let address = RepoAddress::parse("git@github.com:weaveworks/cortex").unwrap();
        fake.respond(Err(process_error("fatal: repository not found")));

        let err = store
            .sync(&address, &store.mirror_path(&address))
            .unwrap_err();
        assert!(matches!(err, GitError::Process { .. }));
    }

    #[test]
    fn test_resolve_branch_head() {
        let (dir, fake, store) = setup();
        fake.respond_stdout("0123456789abcdef\n");

        let hash = store.resolve_branch_head(dir.path(), "master").unwrap();
        assert_eq!(hash.as_str(), "0123456789abcdef");
        assert_eq!(fake.calls(), vec![vec!["rev-list", "-n1", "master", "--"]]);
    }

    #[test]
    fn test_resolve_missing_branch_is_ref_not_found() {
        let (dir, fake, store) = setup();
        fake.respond(Err(process_error(
            "fatal: ambiguous argument 'nope': unknown revision or path not in the working tree.",
        )));

        let err = store.resolve_branch_head(dir.path(), "nope").unwrap_err();
        assert!(err.is_ref_not_found());
    }

    #[test]
    fn test_resolve_other_failure_stays_process_error() {
        let (dir, fake, store) = setup();
        fake.respond(Err(process_error("fatal: not a git repository")));

        let err = store.resolve_branch_head(dir.path(), "master").unwrap_err();
        assert!(matches!(err, GitError::Process { .. }));
    }

    #[test]
    fn test_resolve_empty_output_is_ref_not_found() {
        let (dir, fake, store) = setup();
        fake.respond_stdout("");

        let err = store.resolve_branch_head(dir.path(), "master").unwrap_err();
        assert!(err.is_ref_not_found());
    }

    #[test]
    fn test_ensure_checkout_reuses_existing_worktree() {
        let (dir, fake, store) = setup();
        let mirror = dir.path().join("repos/abc-config");
        let worktree = mirror.join("rev-1111");
        fake_worktree(&worktree);
        let link = store.checkout_link("config");

        fake.respond_stdout("1111\n");
        let checkout = store.ensure_checkout(&mirror, "master", &link).unwrap();

        assert!(!checkout.created);
        assert_eq!(checkout.worktree, worktree);
        assert!(checkout.previous.is_none());
        // only rev-list, no worktree add
        assert_eq!(fake.calls().len(), 1);
        assert!(same_location(&link, &worktree));
    }

    #[test]
    fn test_ensure_checkout_adds_worktree_and_reclaims_old_one() {
        let (dir, fake, store) = setup();
        let mirror = dir.path().join("repos/abc-config");
        let old = mirror.join("rev-1111");
        fake_worktree(&old);
        let link = store.checkout_link("config");

        fake.respond_stdout("1111\n");
        store.ensure_checkout(&mirror, "master", &link).unwrap();

        // The fake does not materialise worktrees, so create it up front.
        let new = mirror.join("rev-2222");
        fake.respond_stdout("2222\n");
        fake_worktree(&new);
        let checkout = store.ensure_checkout(&mirror, "master", &link).unwrap();

        assert!(!checkout.created);
        assert_eq!(checkout.previous.as_deref(), Some(old.as_path()));
        assert!(!old.exists());
        assert!(new.exists());
        assert_eq!(
            fake.calls().last().unwrap(),
            &vec!["worktree".to_string(), "prune".to_string()]
        );
    }

    #[test]
    fn test_ensure_checkout_keeps_worktree_shared_with_other_link() {
        let (dir, fake, store) = setup();
        let mirror = dir.path().join("repos/abc-env");
        let shared = mirror.join("rev-1111");
        let next = mirror.join("rev-2222");
        fake_worktree(&shared);
        fake_worktree(&next);

        let dev = store.checkout_link("env-dev");
        let prod = store.checkout_link("env-prod");

        fake.respond_stdout("1111\n");
        store.ensure_checkout(&mirror, "dev", &dev).unwrap();
        fake.respond_stdout("1111\n");
        store.ensure_checkout(&mirror, "prod", &prod).unwrap();

        fake.respond_stdout("2222\n");
        store.ensure_checkout(&mirror, "dev", &dev).unwrap();

        assert!(shared.exists(), "prod still points at the shared worktree");
        assert!(same_location(&prod, &shared));
        assert!(same_location(&dev, &next));
    }

    #[test]
    fn test_ensure_checkout_runs_worktree_add_on_miss() {
        let (dir, fake, store) = setup();
        let mirror = dir.path().join("repos/abc-config");
        fs::create_dir_all(&mirror).unwrap();
        let link = store.checkout_link("config");

        fake.respond_stdout("3333\n");
        // worktree add fails: the link must not be touched
        fake.respond(Err(process_error("fatal: invalid reference: 3333")));

        let err = store.ensure_checkout(&mirror, "master", &link).unwrap_err();
        assert!(matches!(err, GitError::Process { .. }));
        assert!(fs::symlink_metadata(&link).is_err());

        let calls = fake.calls();
        assert_eq!(calls[1][..3], ["worktree", "add", "--detach"]);
        assert_eq!(calls[1][4], "3333");
    }

    #[test]
    fn test_ensure_checkout_replaces_incomplete_worktree() {
        let (dir, fake, store) = setup();
        let mirror = dir.path().join("repos/abc-config");
        let worktree = mirror.join("rev-3333");
        fs::create_dir_all(&worktree).unwrap();
        fs::write(worktree.join("half-written.yaml"), "kind: Pod\n").unwrap();
        let link = store.checkout_link("config");

        fake.respond_stdout("3333\n");
        let checkout = store.ensure_checkout(&mirror, "master", &link).unwrap();

        assert!(checkout.created);
        assert!(!worktree.join("half-written.yaml").exists());
        let calls = fake.calls();
        assert_eq!(calls[1], vec!["worktree", "prune"]);
        assert_eq!(calls[2][..3], ["worktree", "add", "--detach"]);
    }

    #[test]
    fn test_relative_root_is_made_absolute() {
        let fake = Arc::new(FakeGit::default());
        let store = GitStore::new("data", fake);

        assert!(store.root().is_absolute());
        assert_eq!(store.root(), std::env::current_dir().unwrap().join("data"));
        assert!(store.checkout_link("config").is_absolute());
    }

    #[test]
    fn test_ensure_checkout_passes_absolute_worktree_to_git() {
        let (dir, fake, store) = setup();
        let link = dir.path().join("checkouts/config");

        fake.respond_stdout("4444\n");
        let checkout = store
            .ensure_checkout(Path::new("repos/abc-config"), "master", &link)
            .unwrap();

        let expected = std::env::current_dir()
            .unwrap()
            .join("repos/abc-config/rev-4444");
        assert_eq!(checkout.worktree, expected);
        let calls = fake.calls();
        assert_eq!(calls[1][3], expected.to_string_lossy());
        assert_eq!(
            fake.calls.lock().unwrap()[1].1.as_deref(),
            Some(expected.parent().unwrap())
        );
    }

    #[test]
    fn test_log_builds_first_parent_range() {
        let (dir, fake, store) = setup();
        fake.respond_stdout("abc\u{1f}Jane\u{1f}1500000000\u{1f}Fix\n");

        let revisions = store
            .log_filtered(
                dir.path(),
                &RevSpec::new("aaaaaaa"),
                &RevSpec::new("f7f6cf9e"),
                &["cmd/ruler".to_string()],
            )
            .unwrap();

        assert_eq!(revisions.len(), 1);
        assert_eq!(
            fake.calls()[0],
            vec![
                "log",
                "--first-parent",
                LOG_FORMAT,
                "aaaaaaa..f7f6cf9e",
                "--",
                "cmd/ruler"
            ]
        );
    }

    #[test]
    fn test_log_since_formats_date() {
        let (dir, fake, store) = setup();
        let since = DateTime::from_timestamp(1_500_000_000, 0).unwrap();

        let revisions = store
            .log_since(dir.path(), &RevSpec::new("f7f6cf9e"), since, &[])
            .unwrap();

        assert!(revisions.is_empty());
        assert_eq!(fake.calls()[0][3], "--since=2017-07-14 02:40:00 +0000");
        assert_eq!(fake.calls()[0][4], "f7f6cf9e");
    }
}
