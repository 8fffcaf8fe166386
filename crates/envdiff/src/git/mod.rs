//! Git mirrors, worktree checkouts and commit logs.

pub mod address;
pub mod error;
pub mod parse;
pub mod runner;
pub mod store;
pub mod symlink;
pub mod types;

pub use address::{AddressError, RepoAddress};
pub use error::GitError;
pub use runner::{GitOutput, GitRunner, SystemGit};
pub use store::GitStore;
pub use types::*;
