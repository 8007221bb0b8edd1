//! # Git Engine
//!
//! The version-control operations the synchronizer needs, behind an async
//! trait. Every operation works on the repository stored in the given
//! filesystem image, rooted at `/` with its data under `/.git`.
//!
//! - [`NativeGit`]: libgit2 over directory-backed images, with real
//!   transports, credentials and OpenPGP commit signing
//! - [`MemoryGit`]: in-process engine over any image, with remotes held in a
//!   shared [`MemoryRemote`]; used where no network or disk is wanted

mod memory;
mod native;

pub use memory::{MemoryGit, MemoryRemote};
pub use native::NativeGit;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use specbook_common::FileSystem;
use specbook_model::GitProfile;

use crate::error::GitResult;

/// Credentials sent to a remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub username: String,
    pub password: Option<String>,
}

impl Auth {
    /// Username always, password only when one is configured
    pub fn from_profile(profile: &GitProfile) -> Self {
        Self {
            username: profile.username.clone(),
            password: (!profile.password.is_empty()).then(|| profile.password.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOptions {
    pub url: String,
    pub branch: String,
    pub cors_proxy: Option<String>,
    /// Number of commits to fetch; `None` fetches the whole history
    pub depth: Option<usize>,
    pub single_branch: bool,
    pub auth: Auth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOptions {
    pub author: Author,
    pub message: String,
    /// Armored private key; the commit is signed when present
    pub signing_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOptions {
    pub remote: String,
    pub branch: String,
    pub cors_proxy: Option<String>,
    pub auth: Auth,
}

#[async_trait]
pub trait GitEngine: Send + Sync {
    /// Create an empty repository whose first branch is `default_branch`
    async fn init(&self, fs: &dyn FileSystem, default_branch: &str) -> GitResult<()>;

    async fn add_remote(&self, fs: &dyn FileSystem, name: &str, url: &str) -> GitResult<()>;

    async fn list_remotes(&self, fs: &dyn FileSystem) -> GitResult<Vec<Remote>>;

    async fn delete_remote(&self, fs: &dyn FileSystem, name: &str) -> GitResult<()>;

    /// Fetch a remote branch into an empty image and check it out
    async fn clone_repo(&self, fs: &dyn FileSystem, options: &CloneOptions) -> GitResult<()>;

    async fn current_branch(&self, fs: &dyn FileSystem) -> GitResult<Option<String>>;

    /// Stage the working copy of `path`
    async fn add(&self, fs: &dyn FileSystem, path: &str) -> GitResult<()>;

    /// Stage the removal of `path`
    async fn remove(&self, fs: &dyn FileSystem, path: &str) -> GitResult<()>;

    /// Record the staged tree; returns the new commit id
    async fn commit(&self, fs: &dyn FileSystem, options: &CommitOptions) -> GitResult<String>;

    async fn push(&self, fs: &dyn FileSystem, options: &PushOptions) -> GitResult<()>;

    /// Create a branch at the current commit without checking it out
    async fn branch(&self, fs: &dyn FileSystem, name: &str) -> GitResult<()>;

    /// Reset the index and tracked files to the current commit, dropping
    /// staged and unstaged changes. Untracked files are left alone.
    async fn checkout_head(&self, fs: &dyn FileSystem) -> GitResult<()>;
}
